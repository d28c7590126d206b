/// Approximate token count: the number of whitespace separated words.
///
/// The interpreter backend reports no usage of its own, so the provider
/// approximates it. This is not a tokenizer and the numbers only make sense
/// relative to each other.
pub fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Sum of [`count_tokens`] over several pieces of text.
pub fn count_tokens_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> u32 {
    texts.into_iter().map(count_tokens).sum()
}

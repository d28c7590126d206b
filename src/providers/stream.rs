use std::fmt::Display;
use std::io::BufRead;

use super::base::Usage;
use super::configs::RenderOptions;
use super::formatter::ChunkFormatter;
use super::types::chunk::StreamingChunk;
use super::types::message::GenerateMessage;
use crate::errors::{ProviderError, ProviderResult};
use crate::token_counter::count_tokens;

const DATA_MARKER: &str = "data:";

/// Strip an SSE `data:` marker. Returns `None` for lines that carry no chunk.
pub fn chunk_body(line: &str) -> Option<&str> {
    let line = match line.strip_prefix(DATA_MARKER) {
        Some(rest) => rest.trim(),
        None => line.trim(),
    };
    // Blank separators and SSE comments
    if line.is_empty() || line.starts_with(':') {
        None
    } else {
        Some(line)
    }
}

fn parse_error(e: impl Display, fragment: &str) -> ProviderError {
    ProviderError::BadRequest(format!(
        "Failed to parse response: {}, with text: {}",
        e, fragment
    ))
}

/// Lazily renders a `/stream_chat` response, one message per chunk.
///
/// The stream owns its [`ChunkFormatter`], so formatter state never outlives
/// the response it was built for. Lines are decoded lossily, invalid UTF-8
/// becomes U+FFFD. After the first error the stream is exhausted.
pub struct MessageStream {
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    formatter: ChunkFormatter,
    prompt_tokens: u32,
    finished: bool,
}

impl MessageStream {
    pub fn new<R>(reader: R, prompt_tokens: u32, options: RenderOptions) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            line: Vec::new(),
            formatter: ChunkFormatter::new(options),
            prompt_tokens,
            finished: false,
        }
    }

    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    fn next_fragment(&mut self) -> Option<ProviderResult<String>> {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.line);
                    if let Some(body) = chunk_body(&line) {
                        return Some(Ok(body.to_string()));
                    }
                }
                Err(e) => {
                    return Some(Err(ProviderError::InternalServer(format!(
                        "Failed to read response stream: {}",
                        e
                    ))))
                }
            }
        }
    }

    fn render(&mut self, fragment: &str) -> ProviderResult<GenerateMessage> {
        let chunk = StreamingChunk::parse(fragment).map_err(|e| parse_error(e, fragment))?;
        let content = self
            .formatter
            .format(&chunk)
            .map_err(|e| parse_error(e, fragment))?;

        Ok(GenerateMessage::assistant(
            chunk.kind().as_str(),
            content.as_str(),
            Usage::new(self.prompt_tokens, count_tokens(&content)),
        ))
    }
}

impl Iterator for MessageStream {
    type Item = ProviderResult<GenerateMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = match self.next_fragment()? {
            Ok(fragment) => self.render(&fragment),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "aborting interpreter stream");
            self.finished = true;
        }
        Some(result)
    }
}

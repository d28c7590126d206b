use serde::Serialize;
use serde_json::{Map, Value};

use super::base::Usage;
use super::types::content::SheetSuffix;
use super::types::message::{GenerateMessage, MessageContent, PromptMessage, Role};
use crate::errors::{ProviderError, ProviderResult};
use crate::token_counter::{count_tokens, count_tokens_all};

/// Error code the backend uses for a rejected API key.
pub const INVALID_API_KEY_CODE: &str = "invalid_api_key";

/// One entry of the history sent when no conversation id is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// The `prompt` field of a chat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PromptPayload {
    /// The last user turn, when the backend keeps the conversation itself.
    Text(String),
    /// The whole conversation, when it does not.
    History(Vec<HistoryEntry>),
}

impl PromptPayload {
    pub fn token_count(&self) -> u32 {
        match self {
            PromptPayload::Text(text) => count_tokens(text),
            PromptPayload::History(entries) => {
                count_tokens_all(entries.iter().map(|e| e.content.as_str()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub suffix: SheetSuffix,
    pub sheet_name: String,
    pub file_path: String,
    pub tenant_id: String,
}

/// JSON body of `/chat` and `/stream_chat`.
#[derive(Debug, Serialize)]
pub struct ChatPayload<'a> {
    pub prompt: PromptPayload,
    pub files: Vec<FileDescriptor>,
    pub system_prompt: String,
    pub stop: &'a [String],
    pub user: &'a str,
    pub model_name: &'a str,
    pub api_key: &'a str,
    pub conversation_id: &'a str,
    pub model_parameters: &'a Map<String, Value>,
}

/// Text of the last message, each piece followed by a newline.
pub fn prompt_from_last_message(messages: &[PromptMessage]) -> String {
    let Some(message) = messages.last() else {
        return String::new();
    };

    message.texts().iter().fold(String::new(), |mut prompt, text| {
        prompt.push_str(text);
        prompt.push('\n');
        prompt
    })
}

/// Every text piece of the conversation as `{role, type, content}` entries.
pub fn prompt_with_context(messages: &[PromptMessage]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .flat_map(|message| {
            message.texts().into_iter().map(move |text| HistoryEntry {
                role: message.role,
                kind: message.kind.clone(),
                content: text.to_string(),
            })
        })
        .collect()
}

/// The system prompt, taken only from a plain-text system message in first position.
pub fn system_prompt(messages: &[PromptMessage]) -> String {
    match messages.first() {
        Some(PromptMessage {
            role: Role::System,
            content: MessageContent::Text(text),
            ..
        }) => format!("\n{}", text),
        _ => String::new(),
    }
}

/// Sheets attached to the last message.
pub fn files_from_last_message(messages: &[PromptMessage]) -> Vec<FileDescriptor> {
    messages
        .last()
        .map(|message| {
            message
                .sheets()
                .into_iter()
                .map(|sheet| FileDescriptor {
                    suffix: sheet.suffix,
                    sheet_name: sheet.sheet_name.clone(),
                    file_path: sheet.file_path.clone(),
                    tenant_id: sheet.tenant_id.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map the body of a non-2xx response to a provider error.
pub fn error_from_response(text: &str) -> ProviderError {
    let parsed = serde_json::from_str::<Value>(text)
        .map_err(|e| e.to_string())
        .and_then(|body| {
            let error = body.get("error").ok_or("missing field `error`")?;
            let code = error.get("code").ok_or("missing field `error.code`")?;
            let message = error
                .get("message")
                .ok_or("missing field `error.message`")?;
            Ok((display_value(code), display_value(message)))
        });

    match parsed {
        Ok((code, message)) if code == INVALID_API_KEY_CODE => {
            ProviderError::InvalidApiKey(message)
        }
        Ok((code, message)) => ProviderError::InternalServer(format!(
            "Unknown error: {} with message: {}",
            code, message
        )),
        Err(e) => ProviderError::InternalServer(format!(
            "Failed to convert response to json: {} with text: {}",
            e, text
        )),
    }
}

fn str_field<'a>(result: &'a Value, name: &str) -> ProviderResult<&'a str> {
    result.get(name).and_then(Value::as_str).ok_or_else(|| {
        ProviderError::InternalServer(format!(
            "Response result has no string field `{}`: {}",
            name, result
        ))
    })
}

/// Convert a `/chat` response into a message.
///
/// Only the first element of the response array is used.
pub fn response_to_message(response: &Value, prompt_tokens: u32) -> ProviderResult<GenerateMessage> {
    let results = response.as_array().ok_or_else(|| {
        ProviderError::InternalServer(format!("Expected a JSON array, got: {}", response))
    })?;
    if results.len() > 1 {
        tracing::debug!(
            dropped = results.len() - 1,
            "interpreter returned several results, keeping the first"
        );
    }
    let result = results.first().ok_or_else(|| {
        ProviderError::InternalServer("Empty response from interpreter".to_string())
    })?;

    let content = str_field(result, "content")?;
    let kind = str_field(result, "type")?;

    Ok(GenerateMessage::assistant(
        kind,
        content,
        Usage::new(prompt_tokens, count_tokens(content)),
    ))
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stream::MessageStream;
use super::types::message::{GenerateMessage, PromptMessage};
use crate::errors::ProviderResult;

/// Key in the model parameters that carries the backend conversation id.
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Everything a single backend call needs besides the credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub model: String,
    pub stream: bool,
    pub model_parameters: Map<String, Value>,
    pub stop: Vec<String>,
    pub messages: Vec<PromptMessage>,
    pub user: String,
}

impl GenerateRequest {
    pub fn new<S: Into<String>>(model: S, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_parameter<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.model_parameters.insert(key.into(), value);
        self
    }

    pub fn with_conversation_id<S: Into<String>>(self, conversation_id: S) -> Self {
        self.with_parameter(CONVERSATION_ID_KEY, Value::String(conversation_id.into()))
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = user.into();
        self
    }

    /// The conversation id, if one was given and is a non-empty string.
    pub fn conversation_id(&self) -> Option<&str> {
        self.model_parameters
            .get(CONVERSATION_ID_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// The outcome of [`Provider::generate`].
pub enum Generation {
    Complete(GenerateMessage),
    Stream(MessageStream),
}

/// Base trait for chat backends reached over blocking HTTP.
pub trait Provider: Send + Sync {
    /// Create a provider instance from the environment
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Issue one request and return the whole reply as a single message
    fn complete(&self, request: &GenerateRequest) -> ProviderResult<GenerateMessage>;

    /// Issue one request and return a lazy iterator of rendered reply pieces
    fn stream(&self, request: &GenerateRequest) -> ProviderResult<MessageStream>;

    fn generate(&self, request: &GenerateRequest) -> ProviderResult<Generation> {
        if request.stream {
            self.stream(request).map(Generation::Stream)
        } else {
            self.complete(request).map(Generation::Complete)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(2, 2);
        assert_eq!(usage.prompt_tokens, 2);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 4);
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(10, 20);
        let json_value = serde_json::to_value(usage)?;
        assert_eq!(json_value["prompt_tokens"], json!(10));
        assert_eq!(json_value["completion_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));
        Ok(())
    }

    #[test]
    fn test_conversation_id() {
        let request = GenerateRequest::new("gpt-4o", vec![]);
        assert_eq!(request.conversation_id(), None);

        let request = request.with_conversation_id("");
        assert_eq!(request.conversation_id(), None);

        let request = request.with_conversation_id("conv-1");
        assert_eq!(request.conversation_id(), Some("conv-1"));

        let request = GenerateRequest::new("gpt-4o", vec![]).with_parameter(CONVERSATION_ID_KEY, json!(12));
        assert_eq!(request.conversation_id(), None);
    }
}

use anyhow::Result;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::io::BufReader;

use super::{
    base::{GenerateRequest, Provider},
    configs::InterpreterProviderConfig,
    stream::MessageStream,
    types::message::GenerateMessage,
    utils::{
        error_from_response, files_from_last_message, prompt_from_last_message,
        prompt_with_context, response_to_message, system_prompt, ChatPayload, PromptPayload,
    },
};
use crate::configuration::Settings;
use crate::errors::{ProviderError, ProviderResult};

pub const CHAT_PATH: &str = "/chat";
pub const STREAM_CHAT_PATH: &str = "/stream_chat";

/// Provider for an Open Interpreter style backend.
pub struct InterpreterProvider {
    client: Client,
    config: InterpreterProviderConfig,
}

impl InterpreterProvider {
    pub fn new(config: InterpreterProviderConfig) -> ProviderResult<Self> {
        // `timeout` bounds the connect and each body read, streams included
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::InternalServer(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn check_credentials(&self) -> ProviderResult<()> {
        if self.config.api_key.is_empty() || self.config.server_url.is_empty() {
            return Err(ProviderError::InvalidAuthentication(
                "api_key is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the JSON body for a request, along with its prompt token count.
    pub fn build_payload(&self, request: &GenerateRequest) -> ProviderResult<(Value, u32)> {
        self.check_credentials()?;

        let conversation_id = request.conversation_id();
        let prompt = match conversation_id {
            Some(_) => PromptPayload::Text(prompt_from_last_message(&request.messages)),
            None if self.config.require_conversation_id => {
                return Err(ProviderError::BadRequest(
                    "conversation_id is required".to_string(),
                ))
            }
            None => {
                tracing::warn!("conversation_id is empty, sending the whole conversation");
                PromptPayload::History(prompt_with_context(&request.messages))
            }
        };
        let prompt_tokens = prompt.token_count();

        let payload = ChatPayload {
            prompt,
            files: files_from_last_message(&request.messages),
            system_prompt: system_prompt(&request.messages),
            stop: &request.stop,
            user: &request.user,
            model_name: &request.model,
            api_key: &self.config.api_key,
            conversation_id: conversation_id.unwrap_or_default(),
            model_parameters: &request.model_parameters,
        };
        let payload = serde_json::to_value(&payload).map_err(|e| {
            ProviderError::InternalServer(format!("Failed to serialize request: {}", e))
        })?;

        Ok((payload, prompt_tokens))
    }

    fn post(&self, path: &str, payload: &Value, stream: bool) -> ProviderResult<Response> {
        let url = format!("{}{}", self.config.server_url.trim_end_matches('/'), path);
        tracing::debug!(%url, stream, "invoking interpreter");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .map_err(|e| ProviderError::InternalServer(format!("Failed to invoke model: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            tracing::debug!(%status, body = %text, "interpreter returned an error");
            return Err(error_from_response(&text));
        }
        Ok(response)
    }
}

impl Provider for InterpreterProvider {
    fn from_env() -> Result<Self> {
        let config = Settings::new()?.provider.into_config();
        Ok(Self::new(config)?)
    }

    fn complete(&self, request: &GenerateRequest) -> ProviderResult<GenerateMessage> {
        let (payload, prompt_tokens) = self.build_payload(request)?;
        let response = self.post(CHAT_PATH, &payload, false)?;

        let text = response.text().map_err(|e| {
            ProviderError::InternalServer(format!("Failed to read response: {}", e))
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::InternalServer(format!(
                "Failed to parse response: {}, with text: {}",
                e, text
            ))
        })?;

        response_to_message(&body, prompt_tokens)
    }

    fn stream(&self, request: &GenerateRequest) -> ProviderResult<MessageStream> {
        let (payload, prompt_tokens) = self.build_payload(request)?;
        let response = self.post(STREAM_CHAT_PATH, &payload, true)?;

        Ok(MessageStream::new(
            BufReader::new(response),
            prompt_tokens,
            self.config.render.clone(),
        ))
    }
}

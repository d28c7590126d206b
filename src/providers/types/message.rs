use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::content::{Content, Sheet};
use super::objectid::message_id;
use crate::providers::base::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Content of a prompt message: either a plain string or typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Content>),
}

fn default_kind() -> String {
    "message".to_string()
}

/// A role-tagged unit of conversation history sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub content: MessageContent,
}

impl PromptMessage {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            kind: default_kind(),
            content,
        }
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn with_parts(role: Role, parts: Vec<Content>) -> Self {
        Self::new(role, MessageContent::Parts(parts))
    }

    /// Text pieces of this message, in order. Non-text parts are skipped.
    pub fn texts(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Parts(parts) => parts.iter().filter_map(Content::as_text).collect(),
        }
    }

    pub fn sheets(&self) -> Vec<&Sheet> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts.iter().filter_map(Content::as_sheet).collect(),
        }
    }
}

/// One rendered piece of a reply, as handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateMessage {
    pub id: String,
    pub created: i64,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub usage: Usage,
}

impl GenerateMessage {
    pub fn assistant<K: Into<String>, C: Into<String>>(kind: K, content: C, usage: Usage) -> Self {
        Self {
            id: message_id(),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
            role: Role::Assistant,
            kind: kind.into(),
            content: content.into(),
            usage,
        }
    }
}

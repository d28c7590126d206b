pub mod code_runner;

use serde::{Deserialize, Serialize};

/// One piece of output produced by a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ToolOutput {
    Text(String),
    /// URL of an image produced by the run.
    Image(String),
    /// URL of a downloadable file produced by the run.
    Link(String),
}

impl ToolOutput {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ToolOutput::Text(text.into())
    }
}

impl std::fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolOutput::Text(text) => write!(f, "{}", text),
            ToolOutput::Image(url) => write!(f, "![Image]({})", url),
            ToolOutput::Link(url) => write!(f, "[{}]({})", url, url),
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Where rendered images end up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageOutput {
    /// Inline the PNG as a base64 data URI.
    #[default]
    DataUri,
    /// Write the PNG into this directory and link to the file.
    Directory(PathBuf),
}

/// Options for turning chunks into markdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub image_output: ImageOutput,
    /// Emit progress notices for `active_line` console chunks.
    pub execution_notices: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterProviderConfig {
    pub server_url: String,
    pub api_key: String,
    pub timeout: Duration,
    /// Reject requests without a conversation id instead of sending the whole history.
    pub require_conversation_id: bool,
    pub render: RenderOptions,
}

impl InterpreterProviderConfig {
    pub fn new(server_url: String, api_key: String) -> Self {
        Self {
            server_url,
            api_key,
            timeout: DEFAULT_TIMEOUT,
            require_conversation_id: false,
            render: RenderOptions::default(),
        }
    }
}

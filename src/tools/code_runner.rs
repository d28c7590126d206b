use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::ToolOutput;
use crate::configuration::Settings;
use crate::errors::{ToolError, ToolResult};

pub const RUN_PATH: &str = "/run";
const SUCCESS_CODE: i64 = 200;

/// Parameters of a single code run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRunParams {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub upload_file_name: Option<String>,
    #[serde(default)]
    pub upload_file_url: Option<String>,
}

impl CodeRunParams {
    pub fn new<S: Into<String>>(language: S, code: S) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_upload<S: Into<String>>(mut self, file_name: S, file_url: S) -> Self {
        self.upload_file_name = Some(file_name.into());
        self.upload_file_url = Some(file_url.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct RunPayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    params: &'a CodeRunParams,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    result: RunResult,
}

#[derive(Debug, Default, Deserialize)]
struct RunResult {
    #[serde(default)]
    final_output: Option<FinalOutput>,
    #[serde(default)]
    pic_list: Option<Vec<FileRef>>,
    #[serde(default)]
    file_list: Option<Vec<FileRef>>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FinalOutput {
    Many(Vec<OutputItem>),
    One(OutputItem),
}

impl FinalOutput {
    fn into_text(self) -> Option<String> {
        match self {
            FinalOutput::Many(items) if items.is_empty() => None,
            FinalOutput::Many(items) => Some(items.into_iter().map(|item| item.content).collect()),
            FinalOutput::One(item) => Some(item.content),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileRef {
    Url(String),
    Named { file_url: String },
}

impl FileRef {
    fn into_url(self) -> String {
        match self {
            FileRef::Url(url) => url,
            FileRef::Named { file_url } => file_url,
        }
    }
}

/// Runs code on the interpreter's sandbox through its `/run` endpoint.
pub struct CodeRunnerTool {
    client: Client,
    api_server: String,
}

impl CodeRunnerTool {
    pub fn new<S: Into<String>>(api_server: S) -> ToolResult<Self> {
        let api_server = api_server.into();
        if api_server.is_empty() {
            return Err(ToolError::MissingCredential(
                "api_server is required".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            api_server,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let settings = Settings::new()?;
        Ok(Self::new(settings.tool.require_api_server()?)?)
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    pub fn run(&self, user_id: &str, params: &CodeRunParams) -> ToolResult<Vec<ToolOutput>> {
        tracing::info!(user_id, language = %params.language, "running code");
        tracing::debug!(
            code = %params.code,
            upload_file_name = ?params.upload_file_name,
            upload_file_url = ?params.upload_file_url,
            "code run parameters"
        );

        let url = format!("{}{}", self.api_server.trim_end_matches('/'), RUN_PATH);
        let text = self
            .client
            .post(&url)
            .json(&RunPayload { user_id, params })
            .send()
            .and_then(|response| response.text())
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let response: RunResponse = serde_json::from_str(&text).map_err(|e| {
            ToolError::InvalidResponse(format!("{}, with text: {}", e, text))
        })?;
        tracing::debug!(code = response.code, "code runner responded");

        if response.code != SUCCESS_CODE {
            return Ok(vec![ToolOutput::Text(response.msg)]);
        }

        let result = response.result;
        let mut outputs = Vec::new();
        if let Some(text) = result.final_output.and_then(FinalOutput::into_text) {
            outputs.push(ToolOutput::Text(text));
        }
        outputs.extend(
            result
                .pic_list
                .unwrap_or_default()
                .into_iter()
                .map(|pic| ToolOutput::Image(pic.into_url())),
        );
        outputs.extend(
            result
                .file_list
                .unwrap_or_default()
                .into_iter()
                .map(|file| ToolOutput::Link(file.into_url())),
        );
        Ok(outputs)
    }

    /// Check the api server by running a trivial python snippet.
    pub fn validate_credentials(&self) -> ToolResult<()> {
        self.run(
            "test_user",
            &CodeRunParams::new("python", "print('hello world')"),
        )?;
        Ok(())
    }
}

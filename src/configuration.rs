use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::providers::configs::{
    ImageOutput, InterpreterProviderConfig, RenderOptions, DEFAULT_MODEL, DEFAULT_TIMEOUT,
};

const ENV_PREFIX: &str = "OI";

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    #[serde(default)]
    pub execution_notices: bool,
    #[serde(default)]
    pub require_conversation_id: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: String::new(),
            model: default_model(),
            stream: default_stream(),
            timeout_secs: default_timeout_secs(),
            image_dir: None,
            execution_notices: false,
            require_conversation_id: false,
        }
    }
}

impl ProviderSettings {
    pub fn into_config(self) -> InterpreterProviderConfig {
        let image_output = match self.image_dir {
            Some(dir) => ImageOutput::Directory(dir),
            None => ImageOutput::DataUri,
        };

        InterpreterProviderConfig {
            server_url: self.server_url,
            api_key: self.api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            require_conversation_id: self.require_conversation_id,
            render: RenderOptions {
                image_output,
                execution_notices: self.execution_notices,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolSettings {
    #[serde(default)]
    pub api_server: Option<String>,
}

impl ToolSettings {
    pub fn require_api_server(&self) -> Result<&str, ConfigError> {
        self.api_server
            .as_deref()
            .filter(|server| !server.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("tool.api_server"),
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub tool: ToolSettings,
}

impl Settings {
    /// Load settings from the `OI_*` environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load settings from an optional TOML file, overridden by the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("provider.model", default_model())?
            .set_default("provider.stream", default_stream())?
            .set_default("provider.timeout_secs", default_timeout_secs())?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })
    }
}

/// Environment variable that sets a dotted settings key.
pub fn to_env_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_stream() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

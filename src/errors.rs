use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the interpreter provider.
///
/// Every variant is raised synchronously to the caller; nothing is retried
/// inside the crate.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum ProviderError {
    #[error("Invalid authentication: {0}")]
    InvalidAuthentication(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("Internal server error: {0}")]
    InternalServer(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Failed to reach code runner: {0}")]
    Transport(String),

    #[error("Invalid code runner response: {0}")]
    InvalidResponse(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::InvalidApiKey("key revoked".to_string());
        assert_eq!(err.to_string(), "Invalid API key: key revoked");

        let err = ProviderError::BadRequest("no conversation".to_string());
        assert_eq!(err.to_string(), "Bad request: no conversation");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar {
            env_var: "OI_TOOL__API_SERVER".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: OI_TOOL__API_SERVER"
        );
    }

    #[test]
    fn test_provider_error_serialization() -> anyhow::Result<()> {
        let err = ProviderError::InternalServer("boom".to_string());
        let serialized = serde_json::to_string(&err)?;
        let deserialized: ProviderError = serde_json::from_str(&serialized)?;
        assert_eq!(err, deserialized);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a durable object store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("storage.root must be set for the filesystem backend")]
    MissingRoot,
    #[error("snapshot could not be (de)serialized: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Errors raised by the external music provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("music provider is not configured")]
    Disabled,
    #[error("music provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("music provider answered with status {0}")]
    Status(u16),
    #[error("music provider returned no stream url for `{0}`")]
    MissingUrl(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config.toml or config.default.toml not found")]
    NotFound,
    #[error("{0} is empty")]
    Empty(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Best-effort error frame sent to the originating connection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub message: String,
}

impl ErrorFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn malformed() -> Self {
        Self::new("Malformed message")
    }
}

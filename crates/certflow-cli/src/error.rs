//! CLI error types.

use certflow_protocol::ProtocolError;
use certflow_providers::ProviderError;
use certflow_server::ServerError;
use thiserror::Error;

/// Result type for CLI operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid input: {0}")]
    Input(#[from] ProtocolError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

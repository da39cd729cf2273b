//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating dashboard requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A required field is absent or empty.
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// An upload carried no rows.
    #[error("no data provided")]
    EmptyUpload,

    /// An upload row was not a JSON object.
    #[error("upload row {index} is not an object")]
    InvalidUploadRow { index: usize },
}

impl ProtocolError {
    /// Creates a missing field error.
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

//! Server error types and their HTTP mapping.

use std::io;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use certflow_core::{BatchReport, TableError};
use certflow_protocol::{ErrorCode, ErrorResponse, ProtocolError};
use certflow_providers::ProviderError;
use thiserror::Error;
use tracing::{error, warn};

use crate::batch::{AbortCause, BatchError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body failed validation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request body was not the expected JSON.
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),

    /// The sheet was empty or a required column is absent.
    #[error(transparent)]
    Table(#[from] TableError),

    /// An external call failed before any row was processed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A batch stopped part-way or could not persist its outcomes.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// No session cookie on a request that needs one.
    #[error("not logged in")]
    NotLoggedIn,

    /// The OAuth callback was malformed or did not match the flow cookie.
    #[error("invalid OAuth callback: {message}")]
    OAuthCallback { message: String },

    /// Another run holds the lease for this spreadsheet.
    #[error("a batch is already running for spreadsheet {spreadsheet_id}")]
    RunInProgress { spreadsheet_id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn oauth_callback(message: impl Into<String>) -> Self {
        Self::OAuthCallback {
            message: message.into(),
        }
    }

    pub fn run_in_progress(spreadsheet_id: impl Into<String>) -> Self {
        Self::RunInProgress {
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    /// Machine-readable category for the response body.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) | Self::Body(_) | Self::OAuthCallback { .. } => ErrorCode::BadRequest,
            Self::Table(TableError::MissingColumn { .. }) => ErrorCode::MissingColumn,
            Self::Table(TableError::SourceUnavailable { .. }) => ErrorCode::SourceUnavailable,
            Self::Provider(e) => provider_code(e),
            Self::Batch(BatchError::Aborted { cause, .. }) => match cause {
                AbortCause::Provider(e) => provider_code(e),
                AbortCause::Deadline(_) => ErrorCode::DeadlineExceeded,
            },
            Self::Batch(BatchError::Commit { source, .. }) => provider_code(source),
            Self::NotLoggedIn => ErrorCode::AuthExpired,
            Self::RunInProgress { .. } => ErrorCode::RunInProgress,
            Self::Config { .. } | Self::Io(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::BadRequest | ErrorCode::MissingColumn => StatusCode::BAD_REQUEST,
            ErrorCode::SourceUnavailable => StatusCode::NOT_FOUND,
            ErrorCode::AuthExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::RunInProgress => StatusCode::CONFLICT,
            ErrorCode::AdapterFailure | ErrorCode::DeadlineExceeded => StatusCode::BAD_GATEWAY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The partial report of an interrupted batch, if any.
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Batch(e) => Some(&e.run().report),
            _ => None,
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        let body = ErrorResponse::new(self.code(), self.to_string());
        match self.report() {
            Some(report) => body.with_report(report.clone()),
            None => body,
        }
    }
}

fn provider_code(e: &ProviderError) -> ErrorCode {
    if e.is_auth_expired() {
        ErrorCode::AuthExpired
    } else {
        ErrorCode::AdapterFailure
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = ?self.code(), "request failed: {}", self);
        } else {
            warn!(code = ?self.code(), "request rejected: {}", self);
        }
        (status, Json(self.to_response_body())).into_response()
    }
}

//! Certificate batches and the dashboard server.
//!
//! This crate provides:
//! - The status-gated batch processor and its retry/abort rules
//! - Create and send row handlers over the workspace service traits
//! - Write-back of outcomes into only the processed rows
//! - Per-spreadsheet run leases
//! - The axum dashboard API with a cookie-carried OAuth login
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use certflow_providers::google::{GoogleConfig, OAuthClient, OAuthCredentials};
//! use certflow_server::{AppState, CertificateService, GoogleConnector, ServerConfig, SignalHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let oauth = Arc::new(OAuthClient::new(GoogleConfig::new(OAuthCredentials::new("id", "secret")))?);
//!     let service = Arc::new(CertificateService::new(ServerConfig::default()));
//!     let state = AppState::new(service, Arc::new(GoogleConnector::new(oauth.clone())), oauth);
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!     certflow_server::serve(state, signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

mod adapters;
mod batch;
mod config;
mod cookies;
mod error;
mod http;
mod lease;
mod service;
mod signals;
#[cfg(test)]
mod testing;
mod writer;

pub use adapters::{ATTACHMENT_NAME, CreateCertificate, DeliverCertificate};
pub use batch::{
    AbortCause, BatchError, BatchProcessor, BatchRun, Gate, OutcomeSink, RowAction, RowHandler,
};
pub use config::{BatchConfig, CommitMode, FailurePolicy, MailConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use http::{AppState, Authorizer, router, serve};
pub use lease::{RunLease, RunLeases};
pub use service::{
    CREATE_COLUMNS, CertificateService, GoogleConnector, SEND_COLUMNS, WorkspaceConnector,
    check_columns,
};
pub use signals::{ShutdownSignal, SignalHandler};
pub use writer::{CellValue, ReconciliationWriter, WriteTarget};

//! External service traits and their Google Workspace implementation.
//!
//! - [`SpreadsheetApi`], [`DocumentApi`], [`DeliveryApi`] - the calls a
//!   certificate run makes
//! - [`Workspace`] - the three services bound to one caller's credentials
//! - [`ProviderError`] - error type with retry classification
//!
//! ```text
//!  batch processor / dashboard handlers
//!                 │
//!                 ▼
//!  SpreadsheetApi · DocumentApi · DeliveryApi
//!                 │
//!                 ▼
//!       GoogleWorkspaceClient ── Sheets v4 · Drive v3 · Slides v1 · Gmail v1
//! ```

pub mod api;
pub mod error;
#[cfg(feature = "google")]
pub mod google;

pub use api::{
    Attachment, BoxFuture, DeliveryApi, DocumentApi, DriveFile, Mailbox, OutgoingMessage,
    PDF_MIME_TYPE, SpreadsheetApi, Workspace,
};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult, Service};

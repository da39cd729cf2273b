//! Google Workspace implementation of the service traits.
//!
//! - [`OAuthClient`] runs the web authorization code flow with PKCE and
//!   refreshes access tokens
//! - [`GoogleWorkspaceClient`] implements [`SpreadsheetApi`](crate::SpreadsheetApi),
//!   [`DocumentApi`](crate::DocumentApi) and [`DeliveryApi`](crate::DeliveryApi)
//!   over the Sheets, Drive, Slides and Gmail REST APIs
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certflow_providers::google::{GoogleConfig, GoogleWorkspaceClient, OAuthClient, OAuthCredentials};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new(
//!     "your-client-id.apps.googleusercontent.com",
//!     "your-client-secret",
//! ));
//! let oauth = Arc::new(OAuthClient::new(config)?);
//! let workspace = GoogleWorkspaceClient::connect(oauth, access_token, refresh_token)?
//!     .into_workspace();
//! let rows = workspace.sheets.read_range(&spreadsheet_id, "'Sheet1'!A1:Z").await?;
//! ```

mod client;
mod config;
pub mod mime;
mod oauth;
mod tokens;

pub use client::GoogleWorkspaceClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceFlow, RelayState};
pub use tokens::{GoogleSession, TokenSet};

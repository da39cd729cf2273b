//! Traits for the external services a batch run talks to.
//!
//! The batch processor and the dashboard handlers only see these traits.
//! [`crate::google`] implements them against Google Workspace; tests use
//! in-memory fakes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use certflow_core::{RangeUpdate, TextReplacement};

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// MIME type used when exporting certificates.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A file inside a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

/// A sender or recipient address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub address: String,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            display_name: None,
            address: address.into(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Syntax check for a single bare address: one `@` with text on both
    /// sides and no whitespace, control characters or list delimiters.
    pub fn has_valid_address(&self) -> bool {
        let address = self.address.as_str();
        let Some((local, domain)) = address.split_once('@') else {
            return false;
        };
        !local.is_empty()
            && !domain.is_empty()
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !address.chars().any(|c| {
                c.is_control()
                    || c.is_whitespace()
                    || matches!(c, '<' | '>' | ',' | ';' | '"' | '(' | ')' | '\\')
            })
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name {
            Some(ref name) => write!(f, "\"{}\" <{}>", name.replace('"', ""), self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// A file attached to an outgoing message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// A plain-text message with attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// `None` lets the mail service use the authorized account.
    pub from: Option<Mailbox>,
    pub to: Mailbox,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Range reads and writes on a spreadsheet.
pub trait SpreadsheetApi: Send + Sync {
    /// Reads a range as rows of display strings. Trailing empty cells and
    /// rows may be absent, as the service omits them.
    fn read_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Vec<String>>>>;

    /// Writes several ranges in one request.
    fn write_ranges<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        updates: &'a [RangeUpdate],
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Clears all values in a range.
    fn clear_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Writes a grid starting at the top-left cell of `range`.
    fn update_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
        values: &'a [Vec<String>],
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// File and presentation operations.
pub trait DocumentApi: Send + Sync {
    /// Copies `source_id` into `parent_id` under `name`; returns the new id.
    fn duplicate<'a>(
        &'a self,
        source_id: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>>;

    /// Replaces every occurrence of each `find` text, in order.
    fn substitute_text<'a>(
        &'a self,
        document_id: &'a str,
        replacements: &'a [TextReplacement],
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Exports a document in the given MIME type.
    fn export_as<'a>(
        &'a self,
        document_id: &'a str,
        mime_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<u8>>>;

    /// Lists the non-trashed files directly inside a folder.
    fn list_children<'a>(&'a self, folder_id: &'a str)
    -> BoxFuture<'a, ProviderResult<Vec<DriveFile>>>;

    fn delete<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Outgoing mail.
pub trait DeliveryApi: Send + Sync {
    /// Sends a message; returns the service's message id.
    fn send<'a>(&'a self, message: &'a OutgoingMessage) -> BoxFuture<'a, ProviderResult<String>>;
}

/// The three services bound to one set of credentials.
#[derive(Clone)]
pub struct Workspace {
    pub sheets: Arc<dyn SpreadsheetApi>,
    pub documents: Arc<dyn DocumentApi>,
    pub delivery: Arc<dyn DeliveryApi>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace").finish_non_exhaustive()
    }
}

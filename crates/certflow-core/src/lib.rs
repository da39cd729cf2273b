//! Core types: tables, status gating, write-back planning, templates
//!
//! Nothing in this crate performs I/O; the server crate drives these types
//! against the spreadsheet, document and mail services.

pub mod a1;
pub mod outcome;
pub mod reconcile;
pub mod retry;
pub mod status;
pub mod table;
pub mod template;
pub mod tracing;

pub use outcome::{BatchReport, ProcessingOutcome, RowReport, RowStatus};
pub use reconcile::{RangeUpdate, WritePlan};
pub use retry::RetryPolicy;
pub use status::StatusMarker;
pub use table::{ColumnIndex, RowRecord, Table, TableError, columns};
pub use template::{
    CertificateConstants, MessageTemplate, MessageVars, RenderedMessage, Substitution,
    SubstitutionSource, SubstitutionTable, TextReplacement,
};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};

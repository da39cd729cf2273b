//! Per-row status markers.

use std::fmt;

/// Value of the `Status` column for a row.
///
/// The marker is the idempotency gate: a batch never repeats the side effect
/// for a row whose status already equals the batch's terminal value.
/// Transitions only move forward: `BLANK -> CREATED -> SENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusMarker {
    /// No side effect has been recorded.
    Blank,
    /// A certificate deck exists for the row.
    Created,
    /// The certificate was delivered.
    Sent,
}

impl StatusMarker {
    /// Returns the literal cell value for this marker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blank => "",
            Self::Created => "CREATED",
            Self::Sent => "SENT",
        }
    }

    /// Returns true if `cell` holds exactly this marker.
    ///
    /// Comparison is exact: `"sent"` or `" SENT"` do not match.
    pub fn matches(&self, cell: &str) -> bool {
        cell == self.as_str()
    }
}

impl fmt::Display for StatusMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "BLANK"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

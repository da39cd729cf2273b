//! Tabular view over spreadsheet rows.
//!
//! A [`Table`] is the raw grid returned by a range read: the first row is the
//! header, every following row is a data row positionally aligned to it.
//! Rows are not required to be as wide as the header; a missing cell reads as
//! the empty string.

use std::collections::HashMap;

use thiserror::Error;

/// Header names the certificate workflows rely on.
pub mod columns {
    /// Recipient display name.
    pub const NAME: &str = "Name";
    /// Date printed on the certificate.
    pub const DATE: &str = "Date";
    /// Free-text description printed on the certificate.
    pub const DESCRIPTION: &str = "Description";
    /// Recipient email address.
    pub const EMAIL: &str = "Email";
    /// Identifier of the generated slide deck.
    pub const SLIDE_ID: &str = "Slide ID";
    /// Status marker column (`CREATED`, `SENT`).
    pub const STATUS: &str = "Status";
}

/// Sheet row number of the first data row (the header occupies row 1).
pub const FIRST_DATA_ROW: u32 = 2;

/// Errors raised while interpreting a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// The range read returned no rows at all.
    #[error("no data found in sheet '{sheet}'")]
    SourceUnavailable { sheet: String },

    /// A required header is absent.
    #[error("required column missing: '{name}'")]
    MissingColumn { name: String },
}

impl TableError {
    /// Creates a source unavailable error.
    pub fn source_unavailable(sheet: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            sheet: sheet.into(),
        }
    }

    /// Creates a missing column error.
    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn { name: name.into() }
    }
}

/// A header row plus its data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from the rows of a range read.
    ///
    /// Fails with [`TableError::SourceUnavailable`] when `rows` is empty.
    pub fn from_rows(sheet: &str, mut rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        if rows.is_empty() {
            return Err(TableError::source_unavailable(sheet));
        }
        let header = rows.remove(0);
        Ok(Self { header, rows })
    }

    /// Number of data rows (header excluded).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates data rows in sheet order.
    pub fn rows(&self) -> impl Iterator<Item = RowRecord<'_>> {
        self.rows.iter().enumerate().map(|(i, cells)| RowRecord {
            position: FIRST_DATA_ROW + i as u32,
            cells,
        })
    }

    /// Resolves the given header names, failing on the first one that is absent.
    pub fn column_index(&self, required: &[&str]) -> Result<ColumnIndex, TableError> {
        ColumnIndex::build(&self.header, required)
    }
}

/// Positions of the required headers, resolved once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Builds an index for `required` against `header`.
    ///
    /// Duplicate header names resolve to their first occurrence.
    pub fn build(header: &[String], required: &[&str]) -> Result<Self, TableError> {
        let mut positions = HashMap::with_capacity(required.len());
        for name in required {
            let position = header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| TableError::missing_column(*name))?;
            positions.insert((*name).to_string(), position);
        }
        Ok(Self { positions })
    }

    /// Returns the zero-based position of a column.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Returns the position of a column or a [`TableError::MissingColumn`].
    pub fn require(&self, name: &str) -> Result<usize, TableError> {
        self.get(name).ok_or_else(|| TableError::missing_column(name))
    }
}

/// One data row together with its sheet row number.
#[derive(Debug, Clone, Copy)]
pub struct RowRecord<'a> {
    /// 1-based sheet row (the first data row is 2).
    pub position: u32,
    cells: &'a [String],
}

impl<'a> RowRecord<'a> {
    /// Creates a record directly from cells.
    pub fn new(position: u32, cells: &'a [String]) -> Self {
        Self { position, cells }
    }

    /// Returns the cell at `column`, or `""` when the row is short.
    pub fn cell(&self, column: usize) -> &'a str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Returns the cell under a named header.
    pub fn field(&self, index: &ColumnIndex, name: &str) -> &'a str {
        index.get(name).map(|c| self.cell(c)).unwrap_or("")
    }
}

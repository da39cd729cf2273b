//! Write-back planning.
//!
//! After a batch run, new reference ids and status markers have to be
//! persisted into the sheet. A [`WritePlan`] collects the cells to write and
//! turns them into range updates: one range per run of consecutive rows per
//! column. Rows that were not touched never fall inside a range, so a skipped
//! row sitting between two processed rows keeps its cells.

use std::collections::BTreeMap;

use crate::a1;

/// One range write: a single column span and its values, top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeUpdate {
    /// Range in A1 notation.
    pub range: String,
    /// Values as a column vector (one single-cell row per sheet row).
    pub values: Vec<Vec<String>>,
}

/// Cells to persist for one sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    sheet: String,
    columns: BTreeMap<usize, BTreeMap<u32, String>>,
}

impl WritePlan {
    /// Creates an empty plan for `sheet`.
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            columns: BTreeMap::new(),
        }
    }

    /// Records `value` for the cell at (`row`, `column`). Later writes win.
    pub fn set(&mut self, column: usize, row: u32, value: impl Into<String>) {
        self.columns
            .entry(column)
            .or_default()
            .insert(row, value.into());
    }

    /// Returns true if nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.columns.values().all(BTreeMap::is_empty)
    }

    /// Number of cells planned.
    pub fn cell_count(&self) -> usize {
        self.columns.values().map(BTreeMap::len).sum()
    }

    /// Produces range updates, ordered by column then by row.
    pub fn updates(&self) -> Vec<RangeUpdate> {
        let mut updates = Vec::new();
        for (&column, cells) in &self.columns {
            let mut run: Vec<(u32, &String)> = Vec::new();
            for (&row, value) in cells {
                if let Some(&(last, _)) = run.last()
                    && row != last + 1
                {
                    updates.push(self.flush(column, &run));
                    run.clear();
                }
                run.push((row, value));
            }
            if !run.is_empty() {
                updates.push(self.flush(column, &run));
            }
        }
        updates
    }

    fn flush(&self, column: usize, run: &[(u32, &String)]) -> RangeUpdate {
        let first = run[0].0;
        let last = run[run.len() - 1].0;
        RangeUpdate {
            range: a1::column_span(&self.sheet, column, first, last),
            values: run.iter().map(|(_, v)| vec![(*v).clone()]).collect(),
        }
    }
}

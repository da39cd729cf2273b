//! Writes batch outcomes back into the sheet.

use std::sync::Arc;

use certflow_core::{ColumnIndex, ProcessingOutcome, StatusMarker, TableError, WritePlan, columns};
use certflow_protocol::SheetTarget;
use certflow_providers::{BoxFuture, ProviderResult, SpreadsheetApi};
use tracing::debug;

use crate::batch::OutcomeSink;

/// What to write into a target column for each outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// The outcome's reference id.
    Reference,
    /// A fixed value, typically a status marker.
    Fixed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    /// Zero-based column index in the sheet.
    pub column: usize,
    pub value: CellValue,
}

/// An [`OutcomeSink`] that writes only the cells of processed rows.
///
/// Each target column is written as one range per run of consecutive
/// processed rows, so rows the run did not touch keep their values.
pub struct ReconciliationWriter {
    sheets: Arc<dyn SpreadsheetApi>,
    spreadsheet_id: String,
    sheet_name: String,
    targets: Vec<WriteTarget>,
}

impl ReconciliationWriter {
    pub fn new(
        sheets: Arc<dyn SpreadsheetApi>,
        target: &SheetTarget,
        targets: Vec<WriteTarget>,
    ) -> Self {
        Self {
            sheets,
            spreadsheet_id: target.spreadsheet_id.clone(),
            sheet_name: target.sheet_name.clone(),
            targets,
        }
    }

    /// Create runs record the new deck id and mark the row CREATED.
    pub fn for_create(
        sheets: Arc<dyn SpreadsheetApi>,
        target: &SheetTarget,
        index: &ColumnIndex,
    ) -> Result<Self, TableError> {
        let targets = vec![
            WriteTarget {
                column: index.require(columns::SLIDE_ID)?,
                value: CellValue::Reference,
            },
            WriteTarget {
                column: index.require(columns::STATUS)?,
                value: CellValue::Fixed(StatusMarker::Created.as_str().to_string()),
            },
        ];
        Ok(Self::new(sheets, target, targets))
    }

    /// Send runs only mark the row SENT.
    pub fn for_send(
        sheets: Arc<dyn SpreadsheetApi>,
        target: &SheetTarget,
        index: &ColumnIndex,
    ) -> Result<Self, TableError> {
        let targets = vec![WriteTarget {
            column: index.require(columns::STATUS)?,
            value: CellValue::Fixed(StatusMarker::Sent.as_str().to_string()),
        }];
        Ok(Self::new(sheets, target, targets))
    }

    pub fn plan(&self, outcomes: &[ProcessingOutcome]) -> WritePlan {
        let mut plan = WritePlan::new(&self.sheet_name);
        for outcome in outcomes {
            for target in &self.targets {
                let value = match target.value {
                    CellValue::Reference => outcome.result.clone(),
                    CellValue::Fixed(ref v) => v.clone(),
                };
                plan.set(target.column, outcome.row, value);
            }
        }
        plan
    }
}

impl OutcomeSink for ReconciliationWriter {
    fn commit<'a>(&'a self, outcomes: &'a [ProcessingOutcome]) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let plan = self.plan(outcomes);
            if plan.is_empty() {
                return Ok(());
            }
            let updates = plan.updates();
            debug!(
                cells = plan.cell_count(),
                ranges = updates.len(),
                "writing outcomes back"
            );
            self.sheets
                .write_ranges(&self.spreadsheet_id, &updates)
                .await
        })
    }
}

//! Per-row results of a batch run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A side effect that completed for a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    /// Sheet row number.
    pub row: u32,
    /// New reference id (create path) or delivery confirmation (send path).
    pub result: String,
}

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// The side effect completed.
    Succeeded { reference: String },
    /// The row lacked a precondition (e.g. empty recipient).
    Skipped { reason: String },
    /// The gate column already held the terminal marker.
    AlreadyComplete,
    /// The side effect failed.
    Failed { error: String },
}

/// Report line for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    /// Sheet row number.
    pub row: u32,
    /// Recipient name, for display.
    pub name: String,
    #[serde(flatten)]
    pub status: RowStatus,
}

/// Summary of a whole batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: Vec<RowReport>,
    /// Why the run stopped early, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl BatchReport {
    /// Starts an empty report timestamped now.
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            rows: Vec::new(),
            aborted: None,
        }
    }

    /// Appends a row line.
    pub fn push(&mut self, row: u32, name: impl Into<String>, status: RowStatus) {
        self.rows.push(RowReport {
            row,
            name: name.into(),
            status,
        });
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Number of rows whose side effect completed.
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, RowStatus::Succeeded { .. }))
    }

    /// Number of rows skipped for a missing precondition.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, RowStatus::Skipped { .. }))
    }

    /// Number of rows already at the terminal marker.
    pub fn already_complete(&self) -> usize {
        self.count(|s| matches!(s, RowStatus::AlreadyComplete))
    }

    /// Number of rows that failed.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RowStatus::Failed { .. }))
    }

    /// True when no row was eligible: every row was already complete.
    ///
    /// Distinct from a run where rows were attempted and all failed.
    pub fn no_eligible_rows(&self) -> bool {
        self.rows
            .iter()
            .all(|r| matches!(r.status, RowStatus::AlreadyComplete))
    }

    fn count(&self, pred: impl Fn(&RowStatus) -> bool) -> usize {
        self.rows.iter().filter(|r| pred(&r.status)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters() {
        let mut report = BatchReport::begin();
        report.push(2, "A", RowStatus::Succeeded { reference: "x".into() });
        report.push(3, "B", RowStatus::AlreadyComplete);
        report.push(4, "C", RowStatus::Skipped { reason: "no email".into() });
        report.push(5, "D", RowStatus::Failed { error: "boom".into() });
        report.finish();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.already_complete(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.no_eligible_rows());
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn no_eligible_rows_vs_all_failed() {
        let mut done = BatchReport::begin();
        done.push(2, "A", RowStatus::AlreadyComplete);
        assert!(done.no_eligible_rows());

        let mut failed = BatchReport::begin();
        failed.push(2, "A", RowStatus::Failed { error: "x".into() });
        assert!(!failed.no_eligible_rows());
        assert_eq!(failed.failed(), 1);
    }

    #[test]
    fn row_report_json_shape() {
        let line = RowReport {
            row: 2,
            name: "Ada".into(),
            status: RowStatus::Succeeded {
                reference: "slide-1".into(),
            },
        };
        insta::assert_json_snapshot!(line, @r#"
        {
          "row": 2,
          "name": "Ada",
          "status": "succeeded",
          "reference": "slide-1"
        }
        "#);

        let parsed: RowReport = serde_json::from_str(
            r#"{"row":3,"name":"Bob","status":"already_complete"}"#,
        )
        .unwrap();
        assert_eq!(parsed.status, RowStatus::AlreadyComplete);
    }
}

//! Status-gated batch processing.
//!
//! A run walks the data rows in sheet order. Rows whose gate cell already
//! holds a completion marker are reported and never reach the handler.
//! Every other row goes to the [`RowHandler`]; transient failures are
//! retried under the configured [`RetryPolicy`](certflow_core::RetryPolicy)
//! and persistent ones are handled by the [`FailurePolicy`]. Successful
//! outcomes are handed to an [`OutcomeSink`], either once at the end of the
//! run or after every row.
//!
//! Whatever stops a run early, the outcomes gathered up to that point are
//! committed before the error is returned, so a rerun skips them.

use std::future::Future;
use std::slice;
use std::time::Duration;

use certflow_core::{
    BatchReport, ColumnIndex, ProcessingOutcome, RowRecord, RowStatus, StatusMarker, Table,
    columns,
};
use certflow_providers::{BoxFuture, ProviderError, ProviderResult};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{BatchConfig, CommitMode, FailurePolicy};

/// Result of handling one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// The side effect completed; carries the reference to write back.
    Done(String),
    /// A per-row precondition is missing; nothing was done.
    Skip(String),
}

/// Performs the side effect for one row.
pub trait RowHandler: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    fn process<'a>(
        &'a self,
        row: RowRecord<'a>,
        columns: &'a ColumnIndex,
    ) -> BoxFuture<'a, ProviderResult<RowAction>>;

    /// Whether the row may be processed again after `err`. Handlers whose
    /// side effect must not happen twice narrow this to errors that prove
    /// nothing was done.
    fn is_safe_to_retry(&self, err: &ProviderError) -> bool {
        err.is_retryable()
    }
}

/// Persists successful outcomes.
pub trait OutcomeSink: Send + Sync {
    fn commit<'a>(&'a self, outcomes: &'a [ProcessingOutcome]) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Which column gates a run and which markers mean "already done".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub column: &'static str,
    pub complete: &'static [StatusMarker],
}

impl Gate {
    /// Create runs skip rows that already have a deck, including delivered ones.
    pub const CREATE: Gate = Gate {
        column: columns::STATUS,
        complete: &[StatusMarker::Created, StatusMarker::Sent],
    };

    /// Send runs skip rows that were already delivered.
    pub const SEND: Gate = Gate {
        column: columns::STATUS,
        complete: &[StatusMarker::Sent],
    };

    pub fn is_complete(&self, cell: &str) -> bool {
        self.complete.iter().any(|marker| marker.matches(cell))
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRun {
    pub report: BatchReport,
    /// Successful outcomes in row order.
    pub outcomes: Vec<ProcessingOutcome>,
}

/// Why a run stopped before the last row.
#[derive(Debug, Error)]
pub enum AbortCause {
    #[error(transparent)]
    Provider(ProviderError),

    #[error("batch deadline of {0:?} exceeded")]
    Deadline(Duration),
}

#[derive(Debug, Error)]
pub enum BatchError {
    /// The run stopped early. Outcomes gathered so far were committed.
    #[error("batch stopped at row {row}: {cause}")]
    Aborted {
        row: u32,
        cause: AbortCause,
        run: Box<BatchRun>,
    },

    /// Outcomes could not be written back.
    #[error("failed to write outcomes back to the sheet: {source}")]
    Commit {
        source: ProviderError,
        run: Box<BatchRun>,
    },
}

impl BatchError {
    pub fn run(&self) -> &BatchRun {
        match self {
            Self::Aborted { run, .. } | Self::Commit { run, .. } => run,
        }
    }
}

enum RowFailure {
    Deadline,
    Provider(ProviderError),
}

/// Runs a handler over a table.
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Processes every data row of `table`.
    pub async fn run(
        &self,
        table: &Table,
        columns: &ColumnIndex,
        gate: Gate,
        handler: &dyn RowHandler,
        sink: &dyn OutcomeSink,
    ) -> Result<BatchRun, BatchError> {
        let span = info_span!("batch", handler = handler.name(), rows = table.len());
        self.run_rows(table, columns, gate, handler, sink)
            .instrument(span)
            .await
    }

    async fn run_rows(
        &self,
        table: &Table,
        columns: &ColumnIndex,
        gate: Gate,
        handler: &dyn RowHandler,
        sink: &dyn OutcomeSink,
    ) -> Result<BatchRun, BatchError> {
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let mut run = BatchRun {
            report: BatchReport::begin(),
            outcomes: Vec::new(),
        };
        let mut abort: Option<(u32, AbortCause)> = None;

        for row in table.rows() {
            let name = row.field(columns, columns::NAME);

            if gate.is_complete(row.field(columns, gate.column)) {
                debug!(row = row.position, "already complete");
                run.report
                    .push(row.position, name, RowStatus::AlreadyComplete);
                continue;
            }

            match self.attempt(handler, row, columns, deadline).await {
                Ok(RowAction::Done(reference)) => {
                    debug!(row = row.position, %reference, "row done");
                    let outcome = ProcessingOutcome {
                        row: row.position,
                        result: reference.clone(),
                    };
                    run.report
                        .push(row.position, name, RowStatus::Succeeded { reference });
                    if self.config.commit_mode == CommitMode::PerRow
                        && let Err(source) = self.commit(sink, slice::from_ref(&outcome)).await
                    {
                        run.outcomes.push(outcome);
                        return Err(fail_commit(source, run));
                    }
                    run.outcomes.push(outcome);
                }
                Ok(RowAction::Skip(reason)) => {
                    debug!(row = row.position, %reason, "row skipped");
                    run.report
                        .push(row.position, name, RowStatus::Skipped { reason });
                }
                Err(RowFailure::Deadline) => {
                    let limit = self.config.deadline.unwrap_or_default();
                    let cause = AbortCause::Deadline(limit);
                    run.report.push(
                        row.position,
                        name,
                        RowStatus::Failed {
                            error: cause.to_string(),
                        },
                    );
                    abort = Some((row.position, cause));
                    break;
                }
                Err(RowFailure::Provider(e)) => {
                    warn!(row = row.position, "row failed: {}", e);
                    run.report.push(
                        row.position,
                        name,
                        RowStatus::Failed {
                            error: e.to_string(),
                        },
                    );
                    if e.is_auth_expired() || self.config.failure_policy == FailurePolicy::Abort {
                        abort = Some((row.position, AbortCause::Provider(e)));
                        break;
                    }
                }
            }
        }

        if self.config.commit_mode == CommitMode::Batched
            && !run.outcomes.is_empty()
            && let Err(source) = self.commit(sink, &run.outcomes).await
        {
            return Err(fail_commit(source, run));
        }

        if let Some((row, cause)) = abort {
            run.report.aborted = Some(cause.to_string());
            run.report.finish();
            warn!(row, committed = run.outcomes.len(), "batch aborted: {}", cause);
            return Err(BatchError::Aborted {
                row,
                cause,
                run: Box::new(run),
            });
        }

        run.report.finish();
        info!(
            succeeded = run.report.succeeded(),
            skipped = run.report.skipped(),
            already_complete = run.report.already_complete(),
            failed = run.report.failed(),
            "batch finished"
        );
        Ok(run)
    }

    /// Runs the handler for one row, retrying transient failures.
    async fn attempt(
        &self,
        handler: &dyn RowHandler,
        row: RowRecord<'_>,
        columns: &ColumnIndex,
        deadline: Option<Instant>,
    ) -> Result<RowAction, RowFailure> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = bounded(deadline, handler.process(row, columns))
                .await
                .ok_or(RowFailure::Deadline)?;
            match result {
                Ok(action) => return Ok(action),
                Err(e)
                    if handler.is_safe_to_retry(&e) && self.config.retry.allows_retry(attempts) =>
                {
                    let delay = self.config.retry.backoff_delay(attempts);
                    warn!(row = row.position, attempt = attempts, ?delay, "retrying: {}", e);
                    bounded(deadline, tokio::time::sleep(delay))
                        .await
                        .ok_or(RowFailure::Deadline)?;
                }
                Err(e) => return Err(RowFailure::Provider(e)),
            }
        }
    }

    /// Writes outcomes, retrying transient failures. Not bounded by the
    /// run deadline: outcomes must be persisted even after it expired.
    async fn commit(
        &self,
        sink: &dyn OutcomeSink,
        outcomes: &[ProcessingOutcome],
    ) -> ProviderResult<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match sink.commit(outcomes).await {
                Ok(()) => {
                    debug!(count = outcomes.len(), "outcomes committed");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && self.config.retry.allows_retry(attempts) => {
                    let delay = self.config.retry.backoff_delay(attempts);
                    warn!(attempt = attempts, ?delay, "retrying write-back: {}", e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn fail_commit(source: ProviderError, mut run: BatchRun) -> BatchError {
    run.report.aborted = Some(format!("write-back failed: {}", source));
    run.report.finish();
    tracing::error!(outcomes = run.outcomes.len(), "write-back failed: {}", source);
    BatchError::Commit {
        source,
        run: Box::new(run),
    }
}

async fn bounded<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

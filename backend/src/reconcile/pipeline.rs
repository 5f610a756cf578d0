//! Batch import: compute and apply every line of a document.
//!
//! ```text
//! TabularDocument ──▶ ChangeComputer ──▶ apply_change ──▶ BatchReport
//!   (lines,            (per line,         (per line,       (changes,
//!    rejected rows)     row errors)        savepoint)       failures)
//! ```
//!
//! A dry run computes every line against the unmodified repository. A
//! committed run applies lines one by one, each under its own savepoint, and
//! commits the repository once at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::config::BulkEditConfig;
use crate::error::{PipelineError, PipelineResult, RowError, RowFailure};
use crate::models::{ChangeSet, TabularLine};
use crate::parser::TabularDocument;
use crate::store::{ItemRepository, Transactional};

use super::apply::apply_change;
use super::compare::ChangeComputer;

/// What a row failure does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchPolicy {
    /// The first failure aborts the batch; nothing is written.
    StopOnError,
    /// Failed rows are reported and skipped.
    #[default]
    Continue,
}

/// Options for [`run_import`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Write the changes. Off means preview only.
    pub commit: bool,
    pub policy: BatchPolicy,
}

impl ImportOptions {
    pub fn preview() -> Self {
        Self::default()
    }

    pub fn commit(policy: BatchPolicy) -> Self {
        Self {
            commit: true,
            policy,
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub committed: bool,
    pub started_at: DateTime<Utc>,
    pub rows_processed: usize,
    /// One change set per successfully computed row, in row order.
    pub changes: Vec<ChangeSet>,
    /// Rejected rows, from parsing and from computation.
    pub failures: Vec<RowFailure>,
}

impl BatchReport {
    /// Rows that change (or would change) something.
    pub fn changed_count(&self) -> usize {
        self.changes.iter().filter(|c| c.has_changes()).count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Run a document against the repository.
///
/// With [`BatchPolicy::StopOnError`] any failure rolls the whole batch back
/// and is returned as [`PipelineError::Aborted`].
pub fn run_import<R>(
    repo: &mut R,
    document: &TabularDocument,
    config: &BulkEditConfig,
    options: &ImportOptions,
) -> PipelineResult<BatchReport>
where
    R: ItemRepository + Transactional,
{
    let mut report = BatchReport {
        committed: options.commit,
        started_at: Utc::now(),
        rows_processed: 0,
        changes: Vec::with_capacity(document.lines.len()),
        failures: document.rejected.clone(),
    };

    if options.policy == BatchPolicy::StopOnError {
        if let Some(first) = document.rejected.first() {
            log_error(format!("{}", first));
            return Err(PipelineError::Aborted(first.clone()));
        }
    }

    let mode = if options.commit { "Importing" } else { "Previewing" };
    log_info(format!("{} {} rows...", mode, document.lines.len()));

    let computer = ChangeComputer::new(config);
    let total = document.lines.len();
    let batch_start = options.commit.then(|| repo.savepoint());

    for (index, line) in document.lines.iter().enumerate() {
        report.rows_processed += 1;

        let outcome = computer.compute(&*repo, line).and_then(|mut change| {
            if !options.commit {
                return Ok(change);
            }
            let savepoint = repo.savepoint();
            match apply_change(&mut *repo, &mut change, true) {
                Ok(()) => Ok(change),
                Err(err) => {
                    repo.rollback_to(savepoint);
                    Err(RowError::Store(err))
                }
            }
        });

        match outcome {
            Ok(change) => {
                let kind = if change.new_item { "New item" } else { "Item update" };
                let state = if change.has_changes() { "parsed" } else { "unchanged" };
                log_info_indent(format!("Row {}/{} - {} {}", index + 1, total, kind, state), 1);
                report.changes.push(change);
            }
            Err(err) => {
                let failure = row_failure(line, &err);
                log_error(format!("{}", failure));
                if options.policy == BatchPolicy::StopOnError {
                    if let Some(savepoint) = batch_start {
                        repo.rollback_to(savepoint);
                    }
                    log_warning("Batch aborted, no changes were written");
                    return Err(PipelineError::Aborted(failure));
                }
                report.failures.push(failure);
            }
        }
    }

    if options.commit {
        repo.commit()?;
    }

    report.failures.sort_by(|a, b| (&a.sheet, a.row).cmp(&(&b.sheet, b.row)));

    let verb = if options.commit { "changed" } else { "will be changed" };
    log_success(format!("{} item(s) {}", report.changed_count(), verb));
    if report.has_failures() {
        log_warning(format!("{} row(s) rejected", report.failures.len()));
    }

    Ok(report)
}

fn row_failure(line: &TabularLine, err: &RowError) -> RowFailure {
    let failure = RowFailure::new(line.row, err);
    match &line.sheet {
        Some(sheet) => failure.in_sheet(sheet.clone()),
        None => failure,
    }
}

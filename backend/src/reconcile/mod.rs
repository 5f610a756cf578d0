//! Reconciliation of tabular lines with the repository.
//!
//! - [`compare`] - per-row change computation
//! - [`apply`] - writing a change set
//! - [`pipeline`] - batch orchestration with savepoints

pub mod apply;
pub mod compare;
pub mod pipeline;

mod compare_proptest;

pub use apply::apply_change;
pub use compare::{normalize_text, ChangeComputer, GENERATED_AUTHORITY};
pub use pipeline::{run_import, BatchPolicy, BatchReport, ImportOptions};

//! # Bulkedit - bulk metadata reconciliation for repository items
//!
//! Bulkedit takes a tabular snapshot of desired item state (delimited text or
//! a workbook), diffs every row against the repository field by field,
//! language by language, and reports or applies the minimal change.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│  Reconcile  │────▶│   Report    │
//! │  (any enc)  │     │ (lines, key)│     │(diff, apply)│     │ (text/JSON) │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                                         ┌──────▼──────┐
//!                                         │    Store    │
//!                                         │ (repository)│
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkedit::{load_document, run_import, BulkEditConfig, ImportOptions, MemoryRepository};
//!
//! let config = BulkEditConfig::default();
//! let mut repo = MemoryRepository::open(".bulkedit/repository.json")?;
//! let doc = load_document(path, &config, &repo, &Default::default())?;
//! let report = run_import(&mut repo, &doc, &config, &ImportOptions::preview())?;
//! println!("{} item(s) will be changed", report.changed_count());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Separators, authority control, permissions
//! - [`models`] - Fields, values, lines and change sets
//! - [`parser`] - Delimited text, workbooks and field keys
//! - [`store`] - Repository collaborators and the JSON-backed store
//! - [`reconcile`] - Change computation, application and batches
//! - [`report`] - Change reports and state export
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Storage
pub mod store;

// Reconciliation
pub mod reconcile;

// Reporting
pub mod report;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, FieldKeyError, PipelineError, RowError, RowFailure, ServerError,
    StoreError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{BulkEditConfig, Separators};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ChangeSet, CollectionRef, ItemIdentifier, ItemState, ItemSummary, LineAction,
    MetadataField, MetadataValue, SubmissionMode, TabularLine,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_encoding, load_bytes, load_document, parse_bytes_auto,
    parse_document, parse_workbook, FieldKey, TabularDocument, WorkbookOptions,
};

// =============================================================================
// Re-exports - Storage
// =============================================================================

pub use store::{
    FieldCatalog, FieldDefinition, ItemRepository, MemoryRepository, Transactional,
};

// =============================================================================
// Re-exports - Reconciliation
// =============================================================================

pub use reconcile::{
    apply_change, run_import, BatchPolicy, BatchReport, ChangeComputer, ImportOptions,
};

// =============================================================================
// Re-exports - Reporting
// =============================================================================

pub use report::{export_collection, export_items, ChangeReport};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}

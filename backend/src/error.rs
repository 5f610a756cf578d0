//! Error types for the bulk-edit engine.
//!
//! Errors are layered the same way processing is:
//!
//! - [`CsvError`] - parse-fatal document errors (the whole import stops)
//! - [`RowError`] - row-validation and row-application errors (policy-controlled)
//! - [`StoreError`] - failures reported by the item repository
//! - [`ConfigError`] - unreadable or inconsistent configuration
//! - [`PipelineError`] - top-level batch orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Document Parsing Errors (parse-fatal)
// =============================================================================

/// Which part of a heading could not be matched against the field catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingProblem {
    /// The heading does not follow `schema.element[.qualifier][[lang]]`.
    Syntax,
    /// The schema is not registered.
    UnknownSchema,
    /// The schema exists but has no such element/qualifier.
    UnknownElement,
    /// The `type:` prefix is not a configured authority type.
    UnknownAuthorityType,
}

impl fmt::Display for HeadingProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HeadingProblem::Syntax => "not a valid field key",
            HeadingProblem::UnknownSchema => "unknown metadata schema",
            HeadingProblem::UnknownElement => "unknown metadata element",
            HeadingProblem::UnknownAuthorityType => "unknown authority type",
        };
        f.write_str(text)
    }
}

/// Errors while reading a tabular document. Any of these aborts the import.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the bytes.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Empty file.
    #[error("Document is empty")]
    EmptyFile,

    /// No header row found.
    #[error("No header row found")]
    NoHeaders,

    /// The identifier column is missing.
    #[error("No '{0}' column found in the header row")]
    MissingIdColumn(&'static str),

    /// A heading that is not a known metadata field.
    #[error("Invalid heading '{heading}' in column {column}: {reason}")]
    InvalidHeading {
        column: usize,
        heading: String,
        reason: HeadingProblem,
    },

    /// The same heading appears twice. Positions are 1-indexed.
    #[error("{}Duplicated headers found on cells {first} and {second} ('{heading}')", sheet_prefix(.sheet))]
    DuplicateHeader {
        sheet: Option<String>,
        heading: String,
        first: usize,
        second: usize,
    },

    /// A populated cell sits under a blank or missing heading.
    #[error("Row {row}: column {column} has a value but no heading")]
    MissingHeader { row: u64, column: usize },

    /// The identifier cell is neither `+`, a UUID nor a typed reference.
    #[error("Row {row}: invalid item identifier '{value}'")]
    InvalidIdentifier { row: u64, value: String },

    /// The delimited text itself is broken.
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// The workbook could not be opened or read.
    #[error("Workbook error: {0}")]
    Workbook(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        CsvError::Malformed(err.to_string())
    }
}

fn sheet_prefix(sheet: &Option<String>) -> String {
    match sheet {
        Some(name) => format!("Sheet {} - ", name),
        None => String::new(),
    }
}

// =============================================================================
// Field Key Errors
// =============================================================================

/// A field key that does not match the field-key grammar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldKeyError {
    #[error("'{0}' is not of the form schema.element[.qualifier][[language]]")]
    Syntax(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by the item repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Item not found.
    #[error("Item not found: {0}")]
    ItemNotFound(uuid::Uuid),

    /// Collection not found.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Several items carry the same reference value.
    #[error("Reference {field}={value} matches {count} items")]
    AmbiguousReference {
        field: String,
        value: String,
        count: usize,
    },

    /// IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Row Errors (policy-controlled)
// =============================================================================

/// Errors attached to a single row. Depending on the batch policy the row is
/// skipped or the whole batch is aborted.
#[derive(Debug, Error)]
pub enum RowError {
    /// New items may not carry an action.
    #[error("'{0}' not allowed for new items!")]
    ActionOnNewItem(String),

    /// Unrecognized action keyword.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Invalid sheet action keyword.
    #[error("Invalid action {value}: allowed values are [{allowed}]")]
    InvalidAction { value: String, allowed: String },

    /// Expunge requested but not enabled.
    #[error("'{0}' action is not allowed by configuration")]
    ExpungeDenied(String),

    /// No item matches the identifier.
    #[error("Unknown item '{0}'")]
    UnknownItem(String),

    /// Typed reference with an unconfigured prefix.
    #[error("Unknown reference type '{0}'")]
    UnknownReferenceType(String),

    /// New item without any collection.
    #[error("New items must have a 'collection' assigned in the form of a handle")]
    MissingCollection,

    /// Existing item with an empty collection cell.
    #[error("Missing collection from item {0}")]
    EmptyCollection(String),

    /// Handle that does not resolve to a collection.
    #[error("'{0}' is not a Collection!")]
    NotACollection(String),

    /// The same handle listed twice.
    #[error("Duplicate collection assignment detected: {0}")]
    DuplicateCollection(String),

    /// Adding action on a row that has an identifier.
    #[error("Adding actions can not have an ID set")]
    AddWithIdentifier,

    /// Non-adding action on a row without identifier.
    #[error("Only adding actions can have an empty ID")]
    MissingIdentifier,

    /// Metadata-group row without parent.
    #[error("No PARENT-ID set")]
    MissingParentId,

    /// Metadata-group row pointing nowhere.
    #[error("Invalid PARENT-ID '{0}'")]
    InvalidParentId(String),

    /// Badly formed cell value.
    #[error("Invalid value '{value}' for {field}: {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Identifier cell that cannot be parsed (workbook variant).
    #[error("Invalid item identifier '{0}'")]
    InvalidIdentifier(String),

    /// Multiple values in a metadata-group cell.
    #[error("Multiple metadata value on the same cell not allowed in the metadata group sheets")]
    MultipleGroupValues,

    /// Repository failure while computing or applying.
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// The reported form of a row error: where it happened and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    /// Row number in the source document (the header is row 1).
    pub row: u64,
    /// Sheet name for workbook documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Root-cause message.
    pub message: String,
}

impl RowFailure {
    pub fn new(row: u64, error: &RowError) -> Self {
        Self {
            row,
            sheet: None,
            message: error.to_string(),
        }
    }

    pub fn in_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "Sheet {} - Row {} - {}", sheet, self.row, self.message),
            None => write!(f, "Row {} - {}", self.row, self.message),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level batch errors, returned by [`crate::reconcile::run_import`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document parsing error.
    #[error("Parse error: {0}")]
    Csv(#[from] CsvError),

    /// Repository error outside of any row.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Batch aborted by "stop on first error"; nothing was kept.
    #[error("Import aborted, all changes rolled back: {0}")]
    Aborted(RowFailure),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<CsvError> for ServerError {
    fn from(err: CsvError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for document parsing.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for per-row operations.
pub type RowResult<T> = Result<T, RowError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

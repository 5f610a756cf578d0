//! Domain models for the bulk-edit engine.
//!
//! - [`MetadataField`] - schema, element, qualifier and language of a value
//! - [`MetadataValue`] - one metadata statement with its authority
//! - [`ItemIdentifier`] - what the `id` cell of a row points at
//! - [`LineAction`] - the optional per-row action
//! - [`TabularLine`] - one parsed input row
//! - [`ChangeSet`] - the computed delta for one row

pub mod change;

pub use change::{ChangeSet, SubmissionMode};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::RowError;

/// Confidence of a value that never went through an authority.
pub const CONFIDENCE_UNSET: i32 = -1;

/// Confidence of an authority value accepted as-is.
pub const CONFIDENCE_ACCEPTED: i32 = 600;

// =============================================================================
// Metadata
// =============================================================================

/// Identity of a metadata field, language included.
///
/// `dc.title` and `dc.title[fr]` are different fields for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetadataField {
    pub schema: String,
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl MetadataField {
    pub fn new(
        schema: impl Into<String>,
        element: impl Into<String>,
        qualifier: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        Self {
            schema: schema.into(),
            element: element.into(),
            qualifier: qualifier.map(String::from),
            language: language.map(String::from),
        }
    }

    /// Parse `schema.element[.qualifier]`, without language.
    pub fn from_name(name: &str) -> Option<Self> {
        let mut parts = name.trim().splitn(3, '.');
        let schema = parts.next().filter(|s| !s.is_empty())?;
        let element = parts.next().filter(|s| !s.is_empty())?;
        let qualifier = parts.next().filter(|s| !s.is_empty());
        Some(Self::new(schema, element, qualifier, None))
    }

    /// `schema.element[.qualifier]`
    pub fn name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}.{}", self.schema, self.element, q),
            None => format!("{}.{}", self.schema, self.element),
        }
    }

    /// `schema.element[.qualifier][[language]]`
    pub fn key(&self) -> String {
        match &self.language {
            Some(lang) => format!("{}[{}]", self.name(), lang),
            None => self.name(),
        }
    }

    /// Same field in another language.
    pub fn with_language(&self, language: Option<&str>) -> Self {
        Self {
            language: language.map(String::from),
            ..self.clone()
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One metadata statement, existing or desired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataValue {
    #[serde(flatten)]
    pub field: MetadataField,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default = "unset_confidence")]
    pub confidence: i32,
}

fn unset_confidence() -> i32 {
    CONFIDENCE_UNSET
}

impl MetadataValue {
    pub fn new(field: MetadataField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            authority: None,
            confidence: CONFIDENCE_UNSET,
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>, confidence: i32) -> Self {
        self.authority = Some(authority.into());
        self.confidence = confidence;
        self
    }

    /// Confidence as it is reported: an authority without explicit
    /// confidence counts as accepted.
    pub fn effective_confidence(&self) -> i32 {
        if self.authority.is_some() && self.confidence == CONFIDENCE_UNSET {
            CONFIDENCE_ACCEPTED
        } else {
            self.confidence
        }
    }

    /// `value{sep}authority{sep}confidence`, or just the value when there is
    /// no authority.
    pub fn composite(&self, separator: &str) -> String {
        match &self.authority {
            Some(authority) => format!(
                "{}{sep}{}{sep}{}",
                self.value,
                authority,
                self.effective_confidence(),
                sep = separator
            ),
            None => self.value.clone(),
        }
    }
}

// =============================================================================
// Identifiers and actions
// =============================================================================

/// What the identifier cell of a row refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ItemIdentifier {
    /// `+` (or a blank ID with an adding action in workbooks).
    New,
    /// Storage identifier.
    Id(Uuid),
    /// `PREFIX::value`, resolved through a configured reference field.
    Reference { prefix: String, value: String },
}

/// Separator of typed references, independent of the authority separator.
pub const REFERENCE_SEPARATOR: &str = "::";

/// Marker for new items in the delimited-text format.
pub const NEW_ITEM_MARKER: &str = "+";

impl ItemIdentifier {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == NEW_ITEM_MARKER {
            return Some(ItemIdentifier::New);
        }
        if let Ok(id) = Uuid::parse_str(raw) {
            return Some(ItemIdentifier::Id(id));
        }
        let (prefix, value) = raw.split_once(REFERENCE_SEPARATOR)?;
        let valid_prefix = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_prefix || value.trim().is_empty() {
            return None;
        }
        Some(ItemIdentifier::Reference {
            prefix: prefix.to_string(),
            value: value.trim().to_string(),
        })
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ItemIdentifier::New)
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemIdentifier::New => f.write_str(NEW_ITEM_MARKER),
            ItemIdentifier::Id(id) => write!(f, "{}", id),
            ItemIdentifier::Reference { prefix, value } => {
                write!(f, "{}{}{}", prefix, REFERENCE_SEPARATOR, value)
            }
        }
    }
}

/// Action requested for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineAction {
    #[default]
    NotSpecified,
    Add,
    AddArchive,
    AddWorkspace,
    Update,
    UpdateWorkflow,
    UpdateArchive,
    Delete,
    Expunge,
    Withdraw,
    Reinstate,
}

const SHEET_ACTIONS: &str =
    "ADD, ADD_ARCHIVE, ADD_WORKSPACE, UPDATE, UPDATE_WORKFLOW, UPDATE_ARCHIVE, DELETE";

impl LineAction {
    /// Action cell of the delimited-text format.
    pub fn parse_csv(raw: &str) -> Result<Self, RowError> {
        match raw.trim().to_lowercase().as_str() {
            "" => Ok(LineAction::NotSpecified),
            "expunge" => Ok(LineAction::Expunge),
            "withdraw" => Ok(LineAction::Withdraw),
            "reinstate" => Ok(LineAction::Reinstate),
            _ => Err(RowError::UnknownAction(raw.trim().to_string())),
        }
    }

    /// ACTION cell of the workbook format.
    pub fn parse_sheet(raw: &str) -> Result<Self, RowError> {
        match raw.trim().to_uppercase().as_str() {
            "" => Ok(LineAction::NotSpecified),
            "ADD" => Ok(LineAction::Add),
            "ADD_ARCHIVE" => Ok(LineAction::AddArchive),
            "ADD_WORKSPACE" => Ok(LineAction::AddWorkspace),
            "UPDATE" => Ok(LineAction::Update),
            "UPDATE_WORKFLOW" => Ok(LineAction::UpdateWorkflow),
            "UPDATE_ARCHIVE" => Ok(LineAction::UpdateArchive),
            "DELETE" => Ok(LineAction::Delete),
            _ => Err(RowError::InvalidAction {
                value: raw.trim().to_string(),
                allowed: SHEET_ACTIONS.to_string(),
            }),
        }
    }

    pub fn is_adding(self) -> bool {
        matches!(
            self,
            LineAction::Add | LineAction::AddArchive | LineAction::AddWorkspace
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineAction::NotSpecified => "",
            LineAction::Add => "ADD",
            LineAction::AddArchive => "ADD_ARCHIVE",
            LineAction::AddWorkspace => "ADD_WORKSPACE",
            LineAction::Update => "UPDATE",
            LineAction::UpdateWorkflow => "UPDATE_WORKFLOW",
            LineAction::UpdateArchive => "UPDATE_ARCHIVE",
            LineAction::Delete => "DELETE",
            LineAction::Expunge => "expunge",
            LineAction::Withdraw => "withdraw",
            LineAction::Reinstate => "reinstate",
        }
    }
}

// =============================================================================
// Tabular line
// =============================================================================

/// One input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularLine {
    /// Row number in the source (the header row is 1).
    pub row: u64,
    /// Sheet the row comes from, for workbooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub identifier: ItemIdentifier,
    #[serde(default)]
    pub action: LineAction,
    /// Normalized field key to raw cell values, in cell order.
    /// An empty list means "this field must end up empty".
    pub values: BTreeMap<String, Vec<String>>,
    /// Collection handles, owner first. `None` when the document has no
    /// collection column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
}

impl TabularLine {
    pub fn new(row: u64, identifier: ItemIdentifier) -> Self {
        Self {
            row,
            sheet: None,
            identifier,
            action: LineAction::NotSpecified,
            values: BTreeMap::new(),
            collections: None,
        }
    }

    /// Append values under `key`, keeping earlier ones.
    pub fn push_values(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.values.entry(key.into()).or_default().extend(values);
    }
}

// =============================================================================
// Repository views
// =============================================================================

/// A collection as seen by the engine: its handle and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub handle: String,
    pub name: String,
}

/// Lifecycle state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Workspace,
    Workflow,
    Archived,
}

/// Identity and status of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub state: ItemState,
    #[serde(default)]
    pub withdrawn: bool,
}

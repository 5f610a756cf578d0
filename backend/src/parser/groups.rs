//! Attach metadata-group rows to their parent rows.
//!
//! Workbook documents may carry nested value groups (an author and their
//! affiliation, say) on secondary sheets. Each group row names its parent
//! with `PARENT-ID`, either the parent's identifier or `ROW-ID::<row>`:
//!
//! ```text
//! main                                  authors
//! ┌─────┬───────────┬──────────┐        ┌──────────────┬───────────────┬──────────────┐
//! │ ID  │ dc.title  │          │        │ PARENT-ID    │ dc.contrib... │ dc.subject   │
//! ├─────┼───────────┤          │   →    ├──────────────┼───────────────┼──────────────┤
//! │     │ Paper A   │ (row 2)  │        │ ROW-ID::2    │ Smith, J.     │ Physics      │
//! │ 7f… │ Paper B   │ (row 3)  │        │ 7f…          │ Doe, A.       │              │
//! └─────┴───────────┴──────────┘        └──────────────┴───────────────┴──────────────┘
//! ```
//!
//! Every group row contributes exactly one value per column. Blank cells
//! become [`PLACEHOLDER_VALUE`] so that values stay aligned across columns.

use std::collections::{HashMap, HashSet};

use crate::error::{RowError, RowFailure};
use crate::models::{ItemIdentifier, TabularLine};

/// Prefix of row references in `PARENT-ID` cells.
pub const ROW_ID_PREFIX: &str = "ROW-ID";
/// Value written for blank cells of a group row.
pub const PLACEHOLDER_VALUE: &str = "#PLACEHOLDER_PARENT_METADATA_VALUE#";

/// Parent designation of a group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// `ROW-ID::<row>` of the main sheet.
    Row(u64),
    /// Identifier as written in the main sheet's ID column.
    Identifier(String),
}

impl ParentRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let row_ref = raw
            .split_once("::")
            .filter(|(prefix, _)| prefix.eq_ignore_ascii_case(ROW_ID_PREFIX));
        match row_ref {
            Some((_, row)) => row.trim().parse().ok().map(ParentRef::Row),
            None => Some(ParentRef::Identifier(raw.to_string())),
        }
    }
}

/// Lookup form of an identifier: UUIDs lowercased, reference prefixes
/// uppercased. Unparseable text is only trimmed.
fn identifier_key(raw: &str) -> String {
    match ItemIdentifier::parse(raw) {
        Some(ItemIdentifier::Reference { prefix, value }) => {
            ItemIdentifier::Reference {
                prefix: prefix.to_uppercase(),
                value,
            }
            .to_string()
        }
        Some(identifier) if !identifier.is_new() => identifier.to_string(),
        _ => raw.trim().to_string(),
    }
}

/// One row of a metadata-group sheet.
#[derive(Debug, Clone)]
pub struct MetadataGroup {
    pub sheet: String,
    pub row: u64,
    pub parent: ParentRef,
    /// Normalized field key and value, one per column.
    pub values: Vec<(String, String)>,
}

/// Index of parent lines for group attachment.
pub struct GroupAttacher<'a> {
    lines: &'a mut [TabularLine],
    by_identifier: HashMap<String, usize>,
    by_row: HashMap<u64, usize>,
    rejected_rows: HashSet<u64>,
    rejected_identifiers: HashSet<String>,
}

impl<'a> GroupAttacher<'a> {
    pub fn new(lines: &'a mut [TabularLine]) -> Self {
        let mut by_identifier = HashMap::new();
        let mut by_row = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            by_row.insert(line.row, index);
            if !line.identifier.is_new() {
                by_identifier.insert(identifier_key(&line.identifier.to_string()), index);
            }
        }
        Self {
            lines,
            by_identifier,
            by_row,
            rejected_rows: HashSet::new(),
            rejected_identifiers: HashSet::new(),
        }
    }

    /// Mark a main-sheet row that was already reported. Groups pointing at
    /// it, by row or by identifier, are dropped silently.
    pub fn skip_rejected(&mut self, row: u64, raw_identifier: &str) {
        self.rejected_rows.insert(row);
        if !raw_identifier.trim().is_empty() {
            self.rejected_identifiers.insert(identifier_key(raw_identifier));
        }
    }

    /// Append the group's values to its parent line.
    pub fn attach(&mut self, group: MetadataGroup) -> Result<(), RowFailure> {
        let target = match &group.parent {
            ParentRef::Row(row) if self.rejected_rows.contains(row) => return Ok(()),
            ParentRef::Row(row) => self.by_row.get(row).copied(),
            ParentRef::Identifier(raw) => {
                let key = identifier_key(raw);
                match self.by_identifier.get(&key) {
                    Some(&index) => Some(index),
                    None if self.rejected_identifiers.contains(&key) => return Ok(()),
                    None => None,
                }
            }
        };

        let Some(index) = target else {
            let raw = match &group.parent {
                ParentRef::Row(row) => format!("{}::{}", ROW_ID_PREFIX, row),
                ParentRef::Identifier(id) => id.clone(),
            };
            return Err(
                RowFailure::new(group.row, &RowError::InvalidParentId(raw)).in_sheet(group.sheet),
            );
        };

        let line = &mut self.lines[index];
        for (key, value) in group.values {
            line.push_values(key, vec![value]);
        }
        Ok(())
    }
}

//! Change report: what a batch changed, or would change.
//!
//! The same [`ChangeReport`] renders both ways; only the wording differs:
//!
//! ```text
//! Row 2 - Changes for item: 0b5e0d1a-... (123456789/100)
//!  + Add    (dc.subject): Biology            <- preview
//!  + Added  (dc.subject): Biology            <- committed
//!  - Remove (dc.contributor.author): Smith, J. [rp00001, 600]
//! ```
//!
//! Authority and confidence are shown for authority-controlled fields only.

pub mod export;

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::config::BulkEditConfig;
use crate::error::RowFailure;
use crate::models::{ChangeSet, CollectionRef, ItemSummary, MetadataValue, SubmissionMode};
use crate::reconcile::BatchReport;

pub use export::{export_collection, export_items};

const RULE: &str = "-----------------------------------------------------------";

/// One line of an item's report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportEntry {
    #[serde(rename_all = "camelCase")]
    OwningCollection {
        old: Option<CollectionRef>,
        new: CollectionRef,
    },
    MapCollection { collection: CollectionRef },
    UnmapCollection { collection: CollectionRef },
    AddValue(ValueEntry),
    RemoveValue(ValueEntry),
    Submission { mode: SubmissionMode },
    Expunge,
    Withdraw,
    Reinstate,
}

/// A metadata value as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueEntry {
    pub field: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,
}

/// Report for one changed row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub row: u64,
    pub item: Option<ItemSummary>,
    pub new_item: bool,
    pub entries: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub committed: bool,
    /// Number of items changed (or to be changed).
    pub changed: usize,
    pub items: Vec<ItemReport>,
    pub failures: Vec<RowFailure>,
}

impl ChangeReport {
    /// Build the report of a batch. Rows without changes are left out.
    pub fn from_batch(batch: &BatchReport, config: &BulkEditConfig) -> Self {
        let items: Vec<ItemReport> = batch
            .changes
            .iter()
            .filter(|change| change.has_changes())
            .map(|change| item_report(change, config))
            .collect();

        Self {
            committed: batch.committed,
            changed: items.len(),
            items,
            failures: batch.failures.clone(),
        }
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

fn item_report(change: &ChangeSet, config: &BulkEditConfig) -> ItemReport {
    let mut entries = Vec::new();

    if change.deleted {
        entries.push(ReportEntry::Expunge);
    }
    if change.withdrawn {
        entries.push(ReportEntry::Withdraw);
    }
    if change.reinstated {
        entries.push(ReportEntry::Reinstate);
    }
    if let Some(new) = &change.new_owning_collection {
        entries.push(ReportEntry::OwningCollection {
            old: change.old_owning_collection.clone(),
            new: new.clone(),
        });
    }
    for collection in &change.new_mapped_collections {
        entries.push(ReportEntry::MapCollection {
            collection: collection.clone(),
        });
    }
    for collection in &change.old_mapped_collections {
        entries.push(ReportEntry::UnmapCollection {
            collection: collection.clone(),
        });
    }
    for value in &change.adds {
        entries.push(ReportEntry::AddValue(value_entry(value, config)));
    }
    for value in &change.removes {
        entries.push(ReportEntry::RemoveValue(value_entry(value, config)));
    }
    if let Some(mode) = change.submission {
        entries.push(ReportEntry::Submission { mode });
    }

    ItemReport {
        row: change.row,
        item: change.item.clone(),
        new_item: change.new_item,
        entries,
    }
}

fn value_entry(value: &MetadataValue, config: &BulkEditConfig) -> ValueEntry {
    let controlled = config.is_authority_controlled(&value.field) && value.authority.is_some();
    ValueEntry {
        field: value.field.key(),
        value: value.value.clone(),
        authority: if controlled { value.authority.clone() } else { None },
        confidence: controlled.then(|| value.effective_confidence()),
    }
}

fn describe(collection: &CollectionRef) -> String {
    format!("({}): {}", collection.handle, collection.name)
}

impl ItemReport {
    fn header(&self, committed: bool) -> String {
        let handle = |item: &ItemSummary| match &item.handle {
            Some(handle) => handle.clone(),
            None => "in workflow".to_string(),
        };
        match (&self.item, self.new_item) {
            (Some(item), true) if committed => {
                format!("Row {} - New item: {} ({})", self.row, item.id, handle(item))
            }
            (_, true) => format!("Row {} - New item:", self.row),
            (Some(item), false) => format!(
                "Row {} - Changes for item: {} ({})",
                self.row,
                item.id,
                item.handle.as_deref().unwrap_or("no handle")
            ),
            (None, false) => format!("Row {} - Changes:", self.row),
        }
    }
}

fn write_entry(out: &mut String, entry: &ReportEntry, committed: bool) -> fmt::Result {
    let pick = |preview: &'static str, done: &'static str| if committed { done } else { preview };
    match entry {
        ReportEntry::Expunge => writeln!(out, " - {}", pick("EXPUNGE!", "EXPUNGED!")),
        ReportEntry::Withdraw => writeln!(out, " - {}", pick("WITHDRAW!", "WITHDRAWN!")),
        ReportEntry::Reinstate => writeln!(out, " - {}", pick("REINSTATE!", "REINSTATED!")),
        ReportEntry::OwningCollection { old, new } => {
            if let Some(old) = old {
                writeln!(out, " + Old owning collection {}", describe(old))?;
            }
            writeln!(out, " + New owning collection {}", describe(new))
        }
        ReportEntry::MapCollection { collection } => writeln!(
            out,
            " + {} {}",
            pick("Map to collection", "Mapped to collection"),
            describe(collection)
        ),
        ReportEntry::UnmapCollection { collection } => writeln!(
            out,
            " + {} {}",
            pick("Un-map from collection", "Un-mapped from collection"),
            describe(collection)
        ),
        ReportEntry::AddValue(value) => writeln!(
            out,
            " + {} ({}): {}",
            pick("Add   ", "Added "),
            value.field,
            value_text(value)
        ),
        ReportEntry::RemoveValue(value) => writeln!(
            out,
            " - {} ({}): {}",
            pick("Remove ", "Removed"),
            value.field,
            value_text(value)
        ),
        ReportEntry::Submission { mode } => {
            let text = match mode {
                SubmissionMode::Archive => pick("Install into archive", "Installed into archive"),
                SubmissionMode::Workflow => pick("Submit to workflow", "Submitted to workflow"),
                SubmissionMode::Workspace => pick("Leave in workspace", "Left in workspace"),
            };
            writeln!(out, " + {}", text)
        }
    }
}

fn value_text(value: &ValueEntry) -> String {
    match (&value.authority, value.confidence) {
        (Some(authority), Some(confidence)) => {
            format!("{} [{}, {}]", value.value, authority, confidence)
        }
        _ => value.value.clone(),
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for item in &self.items {
            writeln!(out, "{}", RULE)?;
            writeln!(out, "{}", item.header(self.committed))?;
            for entry in &item.entries {
                write_entry(&mut out, entry, self.committed)?;
            }
        }
        writeln!(out, "{}", RULE)?;

        if !self.failures.is_empty() {
            writeln!(out, "Rejected rows:")?;
            for failure in &self.failures {
                writeln!(out, "  {}", failure)?;
            }
        }

        let verb = if self.committed { "changed" } else { "will be changed" };
        write!(out, "{} item(s) {}", self.changed, verb)?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use crate::reconcile::{run_import, BatchPolicy, ImportOptions};
    use crate::store::fixtures::{self, THESIS_ID};

    fn batch(commit: bool) -> BatchReport {
        let mut repo = fixtures::repository();
        let config = fixtures::config();
        let doc = parse_document(
            &format!(
                "id,collection,dc.subject,dc.contributor.author\n{},123456789/1,Physics||Biology,\"Doe, A.\"\n+,,x,\n",
                THESIS_ID
            ),
            &config,
            &repo,
        )
        .unwrap();
        let options = if commit {
            ImportOptions::commit(BatchPolicy::Continue)
        } else {
            ImportOptions::preview()
        };
        run_import(&mut repo, &doc, &config, &options).unwrap()
    }

    #[test]
    fn test_preview_wording() {
        let report = ChangeReport::from_batch(&batch(false), &fixtures::config());
        let text = report.render_text();

        assert!(text.contains(&format!("Row 2 - Changes for item: {} (123456789/100)", THESIS_ID)));
        assert!(text.contains(" + Un-map from collection (123456789/2): Articles"));
        assert!(text.contains(" + Add    (dc.subject): Biology"));
        assert!(text.contains(" - Remove  (dc.subject): Chemistry"));
        assert!(text.contains(" - Remove  (dc.contributor.author): Smith, J. [rp00001, 600]"));
        assert!(text.contains("Row 3 - New items must have a 'collection' assigned"));
        assert!(text.ends_with("1 item(s) will be changed"));
    }

    #[test]
    fn test_committed_wording() {
        let report = ChangeReport::from_batch(&batch(true), &fixtures::config());
        let text = report.render_text();

        assert!(text.contains(" + Un-mapped from collection (123456789/2): Articles"));
        assert!(text.contains(" + Added  (dc.subject): Biology"));
        assert!(text.contains(" - Removed (dc.subject): Chemistry"));
        assert!(text.ends_with("1 item(s) changed"));
    }

    #[test]
    fn test_report_data_does_not_depend_on_wording() {
        let preview = ChangeReport::from_batch(&batch(false), &fixtures::config());
        let committed = ChangeReport::from_batch(&batch(true), &fixtures::config());
        assert_eq!(preview.items[0].entries, committed.items[0].entries);
        assert_eq!(preview.changed, committed.changed);
    }

    #[test]
    fn test_serialized_entries() {
        let report = ChangeReport::from_batch(&batch(false), &fixtures::config());
        let json = serde_json::to_value(&report).unwrap();
        let entries = json["items"][0]["entries"].as_array().unwrap();
        assert!(entries.iter().any(|e| e["kind"] == "unmapCollection"));
        assert!(entries
            .iter()
            .any(|e| e["kind"] == "removeValue" && e["authority"] == "rp00001"));
        assert_eq!(json["changed"], 1);
    }
}

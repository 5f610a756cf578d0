//! Per-row change record.

use serde::{Deserialize, Serialize};

use super::{CollectionRef, ItemSummary, MetadataField, MetadataValue};

/// Where a new (or still unsubmitted) item ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    /// Installed into the archive right away.
    Archive,
    /// Sent to the review workflow.
    Workflow,
    /// Left in the submitter's workspace.
    Workspace,
}

/// Everything one row changes (or would change) on one item.
///
/// Built by the change computation, consumed once by the applier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Source row.
    pub row: u64,
    /// Target item, `None` for new items until they are created.
    pub item: Option<ItemSummary>,
    pub new_item: bool,
    pub deleted: bool,
    pub withdrawn: bool,
    pub reinstated: bool,
    pub adds: Vec<MetadataValue>,
    pub removes: Vec<MetadataValue>,
    pub constant: Vec<MetadataValue>,
    /// `constant` and `adds` interleaved in input order. The final value list
    /// of every replaced field is taken from here.
    pub complete: Vec<MetadataValue>,
    /// Fields whose whole value list is rewritten from `complete`.
    pub replaced_fields: Vec<MetadataField>,
    pub old_mapped_collections: Vec<CollectionRef>,
    pub new_mapped_collections: Vec<CollectionRef>,
    pub old_owning_collection: Option<CollectionRef>,
    pub new_owning_collection: Option<CollectionRef>,
    pub submission: Option<SubmissionMode>,
}

impl ChangeSet {
    pub fn for_item(row: u64, item: ItemSummary) -> Self {
        Self {
            row,
            item: Some(item),
            ..Self::default()
        }
    }

    pub fn for_new_item(row: u64) -> Self {
        Self {
            row,
            new_item: true,
            ..Self::default()
        }
    }

    pub fn register_add(&mut self, value: MetadataValue) {
        self.complete.push(value.clone());
        self.adds.push(value);
    }

    pub fn register_remove(&mut self, value: MetadataValue) {
        self.removes.push(value);
    }

    pub fn register_constant(&mut self, value: MetadataValue) {
        self.complete.push(value.clone());
        self.constant.push(value);
    }

    pub fn register_replaced(&mut self, field: &MetadataField) {
        if !self.replaced_fields.contains(field) {
            self.replaced_fields.push(field.clone());
        }
    }

    /// Record an owner change. A no-op when both sides are the same handle.
    pub fn change_owning_collection(&mut self, old: Option<CollectionRef>, new: CollectionRef) {
        if old.as_ref().map(|c| &c.handle) == Some(&new.handle) {
            return;
        }
        self.old_owning_collection = old;
        self.new_owning_collection = Some(new);
    }

    pub fn register_new_mapped(&mut self, collection: CollectionRef) {
        self.new_mapped_collections.push(collection);
    }

    pub fn register_old_mapped(&mut self, collection: CollectionRef) {
        self.old_mapped_collections.push(collection);
    }

    pub fn owning_changed(&self) -> bool {
        self.new_owning_collection.is_some()
    }

    /// Whether applying this change set mutates anything. Constant values
    /// never count.
    pub fn has_changes(&self) -> bool {
        !self.adds.is_empty()
            || !self.removes.is_empty()
            || !self.new_mapped_collections.is_empty()
            || !self.old_mapped_collections.is_empty()
            || self.owning_changed()
            || self.deleted
            || self.withdrawn
            || self.reinstated
            || self.submission.is_some()
    }

    /// Fields touched by an add or a remove, in first-seen order.
    pub fn touched_fields(&self) -> Vec<MetadataField> {
        let mut fields: Vec<MetadataField> = Vec::new();
        for value in self.adds.iter().chain(self.removes.iter()) {
            if !fields.contains(&value.field) {
                fields.push(value.field.clone());
            }
        }
        fields
    }

    /// Entries of `complete` for exactly this field.
    pub fn complete_for<'a>(
        &'a self,
        field: &'a MetadataField,
    ) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        self.complete.iter().filter(move |v| &v.field == field)
    }
}

//! JSON-snapshot repository.
//!
//! The whole repository (field catalog, collections, items) lives in memory
//! and is written back to a single JSON file on commit.
//!
//! ```text
//! .bulkedit/repository.json
//! {
//!   "handlePrefix": "123456789",
//!   "fields":      [{ "schema": "dc", "element": "title" }, ...],
//!   "collections": [{ "handle": "123456789/1", "name": "Theses" }, ...],
//!   "items":       [{ "id": "...", "owningCollection": "123456789/1", ... }]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::catalog::{FieldDefinition, FieldId, MetadataRegistry};
use super::{FieldCatalog, ItemRepository, Transactional};
use crate::error::{StoreError, StoreResult};
use crate::models::{CollectionRef, ItemState, ItemSummary, MetadataField, MetadataValue};

/// Default location of the repository snapshot (relative to current dir)
pub const DEFAULT_STORE_PATH: &str = ".bulkedit/repository.json";

/// One stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_collection: Option<String>,
    /// Collections holding the item, owner included once installed.
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default)]
    pub withdrawn: bool,
    #[serde(default)]
    pub metadata: Vec<MetadataValue>,
    pub last_modified: DateTime<Utc>,
}

impl StoredItem {
    fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id,
            handle: self.handle.clone(),
            state: self.state,
            withdrawn: self.withdrawn,
        }
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// Serialized form of the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    #[serde(default = "default_handle_prefix")]
    pub handle_prefix: String,
    #[serde(default = "default_next_handle")]
    pub next_handle: u64,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub collections: Vec<CollectionRef>,
    #[serde(default)]
    pub items: Vec<StoredItem>,
}

fn default_handle_prefix() -> String {
    "123456789".to_string()
}

fn default_next_handle() -> u64 {
    1000
}

impl Default for RepositorySnapshot {
    fn default() -> Self {
        Self {
            handle_prefix: default_handle_prefix(),
            next_handle: default_next_handle(),
            fields: Vec::new(),
            collections: Vec::new(),
            items: Vec::new(),
        }
    }
}

/// Inverse of one item write, replayed by [`Transactional::rollback_to`].
#[derive(Debug, Clone)]
enum Undo {
    /// Item as it was before an in-place change.
    Item(StoredItem),
    Created(Uuid),
    Deleted { index: usize, item: StoredItem },
    NextHandle(u64),
}

/// Repository held in memory, optionally backed by a JSON file.
///
/// Item writes are journaled until the next commit; a savepoint is a
/// position in that journal, so taking one copies nothing.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    path: Option<PathBuf>,
    snapshot: RepositorySnapshot,
    registry: MetadataRegistry,
    journal: Vec<Undo>,
}

impl MemoryRepository {
    /// In-memory repository; `commit` does not write anywhere.
    pub fn from_snapshot(snapshot: RepositorySnapshot) -> Self {
        let registry = MetadataRegistry::new(&snapshot.fields);
        Self {
            path: None,
            snapshot,
            registry,
            journal: Vec::new(),
        }
    }

    /// Load the snapshot at `path`, or start empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            RepositorySnapshot::default()
        };
        let mut repo = Self::from_snapshot(snapshot);
        repo.path = Some(path);
        Ok(repo)
    }

    /// Write the snapshot to its file, if it has one.
    pub fn save(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.snapshot)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> &RepositorySnapshot {
        &self.snapshot
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn item(&self, id: Uuid) -> Option<&StoredItem> {
        self.snapshot.items.iter().find(|i| i.id == id)
    }

    /// Register a collection, replacing the name of an existing handle.
    pub fn add_collection(&mut self, handle: &str, name: &str) {
        match self.snapshot.collections.iter_mut().find(|c| c.handle == handle) {
            Some(existing) => existing.name = name.to_string(),
            None => self.snapshot.collections.push(CollectionRef {
                handle: handle.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn add_field(&mut self, definition: FieldDefinition) {
        self.registry.register(&definition);
        if !self.snapshot.fields.contains(&definition) {
            self.snapshot.fields.push(definition);
        }
    }

    /// Mutable access to an item, journaling its current state first.
    fn item_mut(&mut self, id: Uuid) -> StoreResult<&mut StoredItem> {
        let index = self
            .snapshot
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or(StoreError::ItemNotFound(id))?;
        self.journal.push(Undo::Item(self.snapshot.items[index].clone()));
        Ok(&mut self.snapshot.items[index])
    }

    fn stored(&self, id: Uuid) -> StoreResult<&StoredItem> {
        self.item(id).ok_or(StoreError::ItemNotFound(id))
    }

    fn ensure_collection(&self, handle: &str) -> StoreResult<()> {
        if self.snapshot.collections.iter().any(|c| c.handle == handle) {
            Ok(())
        } else {
            Err(StoreError::CollectionNotFound(handle.to_string()))
        }
    }

    fn mint_handle(&mut self) -> String {
        self.journal.push(Undo::NextHandle(self.snapshot.next_handle));
        let handle = format!("{}/{}", self.snapshot.handle_prefix, self.snapshot.next_handle);
        self.snapshot.next_handle += 1;
        handle
    }
}

impl FieldCatalog for MemoryRepository {
    fn has_schema(&self, schema: &str) -> bool {
        self.registry.has_schema(schema)
    }

    fn resolve(&self, schema: &str, element: &str, qualifier: Option<&str>) -> Option<FieldId> {
        self.registry.resolve(schema, element, qualifier)
    }
}

impl ItemRepository for MemoryRepository {
    fn find_item(&self, id: Uuid) -> StoreResult<Option<ItemSummary>> {
        Ok(self.item(id).map(StoredItem::summary))
    }

    fn find_by_reference(
        &self,
        field: &MetadataField,
        value: &str,
    ) -> StoreResult<Option<ItemSummary>> {
        let matches: Vec<&StoredItem> = self
            .snapshot
            .items
            .iter()
            .filter(|item| {
                item.metadata
                    .iter()
                    .any(|m| m.field.name() == field.name() && m.value == value)
            })
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [item] => Ok(Some(item.summary())),
            many => Err(StoreError::AmbiguousReference {
                field: field.name(),
                value: value.to_string(),
                count: many.len(),
            }),
        }
    }

    fn find_collection(&self, handle: &str) -> StoreResult<Option<CollectionRef>> {
        Ok(self
            .snapshot
            .collections
            .iter()
            .find(|c| c.handle == handle)
            .cloned())
    }

    fn item_ids(&self, collection: Option<&str>) -> StoreResult<Vec<Uuid>> {
        if let Some(handle) = collection {
            self.ensure_collection(handle)?;
        }
        Ok(self
            .snapshot
            .items
            .iter()
            .filter(|item| match collection {
                Some(handle) => {
                    item.owning_collection.as_deref() == Some(handle)
                        || item.collections.iter().any(|c| c == handle)
                }
                None => true,
            })
            .map(|item| item.id)
            .collect())
    }

    fn metadata(&self, item: Uuid, field: &MetadataField) -> StoreResult<Vec<MetadataValue>> {
        Ok(self
            .stored(item)?
            .metadata
            .iter()
            .filter(|m| &m.field == field)
            .cloned()
            .collect())
    }

    fn all_metadata(&self, item: Uuid) -> StoreResult<Vec<MetadataValue>> {
        Ok(self.stored(item)?.metadata.clone())
    }

    fn add_metadata(&mut self, item: Uuid, value: MetadataValue) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.metadata.push(value);
        stored.touch();
        Ok(())
    }

    fn clear_metadata(&mut self, item: Uuid, field: &MetadataField) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.metadata.retain(|m| &m.field != field);
        stored.touch();
        Ok(())
    }

    fn owning_collection(&self, item: Uuid) -> StoreResult<Option<String>> {
        Ok(self.stored(item)?.owning_collection.clone())
    }

    fn collections(&self, item: Uuid) -> StoreResult<Vec<String>> {
        Ok(self.stored(item)?.collections.clone())
    }

    fn create_item(&mut self, owning_collection: &str) -> StoreResult<ItemSummary> {
        self.ensure_collection(owning_collection)?;
        let item = StoredItem {
            id: Uuid::new_v4(),
            handle: None,
            owning_collection: Some(owning_collection.to_string()),
            collections: Vec::new(),
            state: ItemState::Workspace,
            withdrawn: false,
            metadata: Vec::new(),
            last_modified: Utc::now(),
        };
        let summary = item.summary();
        self.journal.push(Undo::Created(item.id));
        self.snapshot.items.push(item);
        Ok(summary)
    }

    fn install_item(&mut self, item: Uuid) -> StoreResult<()> {
        let handle = match self.stored(item)?.handle.clone() {
            Some(handle) => handle,
            None => self.mint_handle(),
        };
        let stored = self.item_mut(item)?;
        stored.handle = Some(handle);
        stored.state = ItemState::Archived;
        if let Some(owner) = stored.owning_collection.clone() {
            if !stored.collections.contains(&owner) {
                stored.collections.insert(0, owner);
            }
        }
        stored.touch();
        Ok(())
    }

    fn start_workflow(&mut self, item: Uuid) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.state = ItemState::Workflow;
        stored.touch();
        Ok(())
    }

    fn set_owning_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()> {
        self.ensure_collection(handle)?;
        let stored = self.item_mut(item)?;
        stored.owning_collection = Some(handle.to_string());
        stored.touch();
        Ok(())
    }

    fn add_to_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()> {
        self.ensure_collection(handle)?;
        let stored = self.item_mut(item)?;
        if !stored.collections.iter().any(|c| c == handle) {
            stored.collections.push(handle.to_string());
            stored.touch();
        }
        Ok(())
    }

    fn remove_from_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.collections.retain(|c| c != handle);
        stored.touch();
        Ok(())
    }

    fn delete_item(&mut self, item: Uuid) -> StoreResult<()> {
        let index = self
            .snapshot
            .items
            .iter()
            .position(|i| i.id == item)
            .ok_or(StoreError::ItemNotFound(item))?;
        let removed = self.snapshot.items.remove(index);
        self.journal.push(Undo::Deleted {
            index,
            item: removed,
        });
        Ok(())
    }

    fn withdraw(&mut self, item: Uuid) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.withdrawn = true;
        stored.touch();
        Ok(())
    }

    fn reinstate(&mut self, item: Uuid) -> StoreResult<()> {
        let stored = self.item_mut(item)?;
        stored.withdrawn = false;
        stored.touch();
        Ok(())
    }
}

impl Transactional for MemoryRepository {
    /// Journal length when the savepoint was taken.
    type Savepoint = usize;

    fn savepoint(&self) -> usize {
        self.journal.len()
    }

    fn rollback_to(&mut self, savepoint: usize) {
        while self.journal.len() > savepoint {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            let items = &mut self.snapshot.items;
            match undo {
                Undo::Item(before) => {
                    if let Some(item) = items.iter_mut().find(|i| i.id == before.id) {
                        *item = before;
                    }
                }
                Undo::Created(id) => items.retain(|i| i.id != id),
                Undo::Deleted { index, item } => {
                    let index = index.min(items.len());
                    items.insert(index, item);
                }
                Undo::NextHandle(next) => self.snapshot.next_handle = next,
            }
        }
    }

    /// Save the snapshot. Savepoints taken before a commit are void after it.
    fn commit(&mut self) -> StoreResult<()> {
        self.save()?;
        self.journal.clear();
        Ok(())
    }
}

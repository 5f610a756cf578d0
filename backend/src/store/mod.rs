//! Collaborators consumed by the engine.
//!
//! The engine never talks to storage directly. It reads and writes through:
//!
//! - [`FieldCatalog`] - which `schema.element.qualifier` fields exist
//! - [`ItemRepository`] - item lookup, metadata, collection membership, lifecycle
//! - [`Transactional`] - savepoints for row-level and batch-level rollback
//!
//! [`MemoryRepository`] implements all three over a JSON snapshot and is what
//! the CLI and the HTTP server run against.

pub mod catalog;
pub mod memory;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{FieldDefinition, FieldId, MetadataRegistry};
pub use memory::{MemoryRepository, RepositorySnapshot, StoredItem};

use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{CollectionRef, ItemSummary, MetadataField, MetadataValue};

/// Field catalog lookup.
pub trait FieldCatalog {
    fn has_schema(&self, schema: &str) -> bool;

    fn resolve(&self, schema: &str, element: &str, qualifier: Option<&str>) -> Option<FieldId>;
}

/// Item storage as seen by the reconciliation engine.
///
/// Collections are addressed by handle. Metadata reads and writes use the
/// full field identity, language included.
pub trait ItemRepository {
    fn find_item(&self, id: Uuid) -> StoreResult<Option<ItemSummary>>;

    /// Item whose `field` holds exactly `value`.
    fn find_by_reference(&self, field: &MetadataField, value: &str)
        -> StoreResult<Option<ItemSummary>>;

    fn find_collection(&self, handle: &str) -> StoreResult<Option<CollectionRef>>;

    /// Items, optionally restricted to members of one collection.
    fn item_ids(&self, collection: Option<&str>) -> StoreResult<Vec<Uuid>>;

    /// Values of exactly this field (schema, element, qualifier, language).
    fn metadata(&self, item: Uuid, field: &MetadataField) -> StoreResult<Vec<MetadataValue>>;

    fn all_metadata(&self, item: Uuid) -> StoreResult<Vec<MetadataValue>>;

    fn add_metadata(&mut self, item: Uuid, value: MetadataValue) -> StoreResult<()>;

    /// Remove every value of exactly this field.
    fn clear_metadata(&mut self, item: Uuid, field: &MetadataField) -> StoreResult<()>;

    fn owning_collection(&self, item: Uuid) -> StoreResult<Option<String>>;

    /// Every collection holding the item, owner included.
    fn collections(&self, item: Uuid) -> StoreResult<Vec<String>>;

    /// New workspace item destined for `owning_collection`.
    fn create_item(&mut self, owning_collection: &str) -> StoreResult<ItemSummary>;

    fn install_item(&mut self, item: Uuid) -> StoreResult<()>;

    fn start_workflow(&mut self, item: Uuid) -> StoreResult<()>;

    fn set_owning_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()>;

    fn add_to_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()>;

    fn remove_from_collection(&mut self, item: Uuid, handle: &str) -> StoreResult<()>;

    fn delete_item(&mut self, item: Uuid) -> StoreResult<()>;

    fn withdraw(&mut self, item: Uuid) -> StoreResult<()>;

    fn reinstate(&mut self, item: Uuid) -> StoreResult<()>;
}

/// Transaction scope over a repository.
pub trait Transactional {
    type Savepoint;

    fn savepoint(&self) -> Self::Savepoint;

    /// Undo everything done since `savepoint` was taken.
    fn rollback_to(&mut self, savepoint: Self::Savepoint);

    /// Make the current state durable.
    fn commit(&mut self) -> StoreResult<()>;
}

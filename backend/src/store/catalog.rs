//! Metadata field registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::FieldCatalog;

/// Identity of a registered field.
pub type FieldId = u32;

/// A registered `schema.element[.qualifier]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub schema: String,
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Free-text description shown by `bulkedit fields`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_note: Option<String>,
}

impl FieldDefinition {
    pub fn new(schema: &str, element: &str, qualifier: Option<&str>) -> Self {
        Self {
            schema: schema.to_string(),
            element: element.to_string(),
            qualifier: qualifier.map(String::from),
            scope_note: None,
        }
    }

    pub fn name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}.{}", self.schema, self.element, q),
            None => format!("{}.{}", self.schema, self.element),
        }
    }
}

type FieldTuple = (String, String, Option<String>);

/// In-memory field catalog.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    schemas: BTreeSet<String>,
    fields: BTreeMap<FieldTuple, FieldId>,
}

impl MetadataRegistry {
    pub fn new(definitions: &[FieldDefinition]) -> Self {
        let mut registry = Self::default();
        for definition in definitions {
            registry.register(definition);
        }
        registry
    }

    /// Register a field, returning its id. Registering twice is harmless.
    pub fn register(&mut self, definition: &FieldDefinition) -> FieldId {
        self.schemas.insert(definition.schema.clone());
        let next = self.fields.len() as FieldId + 1;
        *self
            .fields
            .entry((
                definition.schema.clone(),
                definition.element.clone(),
                definition.qualifier.clone(),
            ))
            .or_insert(next)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FieldCatalog for MetadataRegistry {
    fn has_schema(&self, schema: &str) -> bool {
        self.schemas.contains(schema)
    }

    fn resolve(&self, schema: &str, element: &str, qualifier: Option<&str>) -> Option<FieldId> {
        self.fields
            .get(&(
                schema.to_string(),
                element.to_string(),
                qualifier.map(String::from),
            ))
            .copied()
    }
}

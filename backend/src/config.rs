//! Engine configuration.
//!
//! A [`BulkEditConfig`] is built once per invocation and handed explicitly to
//! the parser and the reconciliation engine. It is loaded from an optional
//! JSON file and then overlaid with `BULKEDIT_*` environment variables.
//!
//! ```json
//! {
//!   "separators": { "field": "tab", "value": "||", "authority": "::" },
//!   "authorityControlled": ["dc.contributor.author"],
//!   "authorityTypes": ["orcid"],
//!   "allowExpunge": false,
//!   "useWorkflow": false,
//!   "referenceFields": { "ORCID": "person.identifier.orcid" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::ConfigError;
use crate::models::MetadataField;

/// Separators used by the delimited-text format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Separators {
    /// Field separator: a single ASCII character or one of `comma`, `tab`,
    /// `semicolon`, `hash`.
    pub field: String,
    /// Separator between values of a multi-valued cell.
    pub value: String,
    /// Separator between a value, its authority and its confidence.
    pub authority: String,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: ",".to_string(),
            value: "||".to_string(),
            authority: "::".to_string(),
        }
    }
}

impl Separators {
    /// The field separator as a byte for the CSV reader.
    pub fn delimiter(&self) -> Result<u8, ConfigError> {
        let resolved = match self.field.to_lowercase().as_str() {
            "comma" => ",".to_string(),
            "tab" => "\t".to_string(),
            "semicolon" => ";".to_string(),
            "hash" => "#".to_string(),
            _ => self.field.clone(),
        };
        match resolved.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(ConfigError::InvalidValue {
                key: "separators.field".into(),
                message: format!("'{}' is not a single ASCII character", self.field),
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter()?;
        if self.value.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "separators.value".into(),
                message: "must not be empty".into(),
            });
        }
        if self.authority.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "separators.authority".into(),
                message: "must not be empty".into(),
            });
        }
        if self.value == self.authority {
            return Err(ConfigError::InvalidValue {
                key: "separators".into(),
                message: "value and authority separators must differ".into(),
            });
        }
        Ok(())
    }
}

/// Configuration shared by the parser and the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BulkEditConfig {
    pub separators: Separators,
    /// Field names (`schema.element[.qualifier]`) whose values carry an
    /// authority and a confidence.
    pub authority_controlled: BTreeSet<String>,
    /// Accepted `type:` prefixes on headings.
    pub authority_types: BTreeSet<String>,
    /// Whether `expunge`/`DELETE` may remove items permanently.
    pub allow_expunge: bool,
    /// Send new items without an explicit submission action into workflow.
    pub use_workflow: bool,
    /// Typed-reference prefix to the field holding the reference value.
    pub reference_fields: BTreeMap<String, String>,
}

impl Default for BulkEditConfig {
    fn default() -> Self {
        let mut reference_fields = BTreeMap::new();
        reference_fields.insert("ORCID".to_string(), "person.identifier.orcid".to_string());
        reference_fields.insert("DOI".to_string(), "dc.identifier.doi".to_string());
        reference_fields.insert("HANDLE".to_string(), "dc.identifier.uri".to_string());

        Self {
            separators: Separators::default(),
            authority_controlled: BTreeSet::new(),
            authority_types: ["orcid".to_string()].into_iter().collect(),
            allow_expunge: false,
            use_workflow: false,
            reference_fields,
        }
    }
}

impl BulkEditConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.separators.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `BULKEDIT_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = var("BULKEDIT_ALLOW_EXPUNGE") {
            self.allow_expunge = parse_bool("BULKEDIT_ALLOW_EXPUNGE", &v)?;
        }
        if let Some(v) = var("BULKEDIT_USE_WORKFLOW") {
            self.use_workflow = parse_bool("BULKEDIT_USE_WORKFLOW", &v)?;
        }
        if let Some(v) = var("BULKEDIT_AUTHORITY_CONTROLLED") {
            self.authority_controlled = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("BULKEDIT_FIELD_SEPARATOR") {
            self.separators.field = v;
        }
        if let Some(v) = var("BULKEDIT_VALUE_SEPARATOR") {
            self.separators.value = v;
        }
        if let Some(v) = var("BULKEDIT_AUTHORITY_SEPARATOR") {
            self.separators.authority = v;
        }
        self.separators.validate()
    }

    /// Whether values of `field` keep their authority when compared.
    /// Language never matters here.
    pub fn is_authority_controlled(&self, field: &MetadataField) -> bool {
        self.authority_controlled.contains(&field.name())
    }

    pub fn is_authority_type(&self, prefix: &str) -> bool {
        self.authority_types.contains(&prefix.to_lowercase())
    }

    /// Field used to resolve a `PREFIX::value` identifier.
    pub fn reference_field(&self, prefix: &str) -> Option<MetadataField> {
        let name = self.reference_fields.get(&prefix.to_uppercase())?;
        MetadataField::from_name(name)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", other),
        }),
    }
}

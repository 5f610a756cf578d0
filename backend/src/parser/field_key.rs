//! Field key grammar.
//!
//! ```text
//! [authority_type:]schema.element[.qualifier][[language]]
//!
//! orcid:dc.contributor.author[en]
//! └─┬─┘ └┬┘ └────┬────┘ └─┬──┘└┬┘
//!   │    │       │        │    └── language (None when absent or empty)
//!   │    │       │        └─────── qualifier (None when absent)
//!   │    │       └──────────────── element
//!   │    └──────────────────────── schema
//!   └───────────────────────────── authority type (kept for authority lookups)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FieldKeyError;
use crate::models::MetadataField;

static FIELD_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<authority>[^:.\[\]]+):)?(?P<schema>[^.:\[\]]+)\.(?P<element>[^.:\[\]]+)(?:\.(?P<qualifier>[^.:\[\]]+))?(?:\[(?P<language>[^\]]*)\])?$",
    )
    .expect("field key pattern is valid")
});

/// A parsed heading or field key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    /// `type` from a `type:` prefix.
    pub authority_type: Option<String>,
    pub field: MetadataField,
    /// The key as written.
    pub raw: String,
}

impl FieldKey {
    pub fn parse(raw: &str) -> Result<Self, FieldKeyError> {
        let trimmed = raw.trim();
        let caps = FIELD_KEY
            .captures(trimmed)
            .ok_or_else(|| FieldKeyError::Syntax(raw.to_string()))?;

        let text = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };

        let schema = text("schema").ok_or_else(|| FieldKeyError::Syntax(raw.to_string()))?;
        let element = text("element").ok_or_else(|| FieldKeyError::Syntax(raw.to_string()))?;

        Ok(Self {
            authority_type: text("authority").map(String::from),
            field: MetadataField::new(schema, element, text("qualifier"), text("language")),
            raw: raw.to_string(),
        })
    }

    /// Canonical spelling: authority prefix, then the field key.
    pub fn normalized(&self) -> String {
        match &self.authority_type {
            Some(authority) => format!("{}:{}", authority, self.field.key()),
            None => self.field.key(),
        }
    }

    pub fn is_authority_column(&self) -> bool {
        self.authority_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_element() {
        let key = FieldKey::parse("dc.title").unwrap();
        assert_eq!(key.field.schema, "dc");
        assert_eq!(key.field.element, "title");
        assert_eq!(key.field.qualifier, None);
        assert_eq!(key.field.language, None);
        assert_eq!(key.authority_type, None);
    }

    #[test]
    fn test_full_key() {
        let key = FieldKey::parse("orcid:dc.contributor.author[en]").unwrap();
        assert_eq!(key.authority_type.as_deref(), Some("orcid"));
        assert_eq!(key.field.qualifier.as_deref(), Some("author"));
        assert_eq!(key.field.language.as_deref(), Some("en"));
        assert_eq!(key.normalized(), "orcid:dc.contributor.author[en]");
    }

    #[test]
    fn test_language_on_element() {
        let key = FieldKey::parse("dc.title[fr]").unwrap();
        assert_eq!(key.field.element, "title");
        assert_eq!(key.field.qualifier, None);
        assert_eq!(key.field.language.as_deref(), Some("fr"));
    }

    #[test]
    fn test_language_stripped_from_qualifier() {
        let key = FieldKey::parse("dc.title.alternative[de]").unwrap();
        assert_eq!(key.field.qualifier.as_deref(), Some("alternative"));
        assert_eq!(key.field.language.as_deref(), Some("de"));
    }

    #[test]
    fn test_empty_language_is_none() {
        let key = FieldKey::parse("dc.title[]").unwrap();
        assert_eq!(key.field.language, None);
        assert_eq!(key.normalized(), "dc.title");
    }

    #[test]
    fn test_no_dot_fails() {
        assert!(matches!(FieldKey::parse("title"), Err(FieldKeyError::Syntax(_))));
        assert!(FieldKey::parse("collection").is_err());
    }

    #[test]
    fn test_malformed_keys_fail() {
        assert!(FieldKey::parse("dc..title").is_err());
        assert!(FieldKey::parse("dc.title.").is_err());
        assert!(FieldKey::parse("dc.a.b.c").is_err());
        assert!(FieldKey::parse("dc.title[en").is_err());
        assert!(FieldKey::parse("a:b:dc.title").is_err());
    }

    #[test]
    fn test_surrounding_whitespace() {
        let key = FieldKey::parse("  dc.subject ").unwrap();
        assert_eq!(key.field.key(), "dc.subject");
        assert_eq!(key.raw, "  dc.subject ");
    }
}

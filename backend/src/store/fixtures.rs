//! Sample repository shared by unit tests.

use chrono::Utc;
use uuid::Uuid;

use super::catalog::FieldDefinition;
use super::memory::{MemoryRepository, RepositorySnapshot, StoredItem};
use crate::config::BulkEditConfig;
use crate::models::{CollectionRef, ItemState, MetadataField, MetadataValue, CONFIDENCE_ACCEPTED};

pub const THESES: &str = "123456789/1";
pub const ARTICLES: &str = "123456789/2";
pub const DATASETS: &str = "123456789/3";

/// Owned by Theses, mapped to Articles.
pub const THESIS_ID: Uuid = Uuid::from_u128(0x0b5e_0d1a_7c3f_4e2a_9a11_3c5d_2f6e_0001);
/// Holds an ORCID, owned by Datasets.
pub const PERSON_ID: Uuid = Uuid::from_u128(0x0b5e_0d1a_7c3f_4e2a_9a11_3c5d_2f6e_0002);
/// Withdrawn, owned by Articles.
pub const WITHDRAWN_ID: Uuid = Uuid::from_u128(0x0b5e_0d1a_7c3f_4e2a_9a11_3c5d_2f6e_0003);

pub fn field(key: &str) -> MetadataField {
    let (name, language) = match key.split_once('[') {
        Some((name, rest)) => (name, Some(rest.trim_end_matches(']'))),
        None => (key, None),
    };
    let base = MetadataField::from_name(name).expect("fixture field name");
    base.with_language(language)
}

pub fn value(key: &str, text: &str) -> MetadataValue {
    MetadataValue::new(field(key), text)
}

/// Authority control on `dc.contributor.author`, expunge allowed.
pub fn config() -> BulkEditConfig {
    let mut config = BulkEditConfig::default();
    config
        .authority_controlled
        .insert("dc.contributor.author".to_string());
    config.allow_expunge = true;
    config
}

fn item(
    id: Uuid,
    handle: &str,
    owner: &str,
    collections: &[&str],
    metadata: Vec<MetadataValue>,
) -> StoredItem {
    StoredItem {
        id,
        handle: Some(handle.to_string()),
        owning_collection: Some(owner.to_string()),
        collections: collections.iter().map(|c| c.to_string()).collect(),
        state: ItemState::Archived,
        withdrawn: false,
        metadata,
        last_modified: Utc::now(),
    }
}

pub fn snapshot() -> RepositorySnapshot {
    let fields = [
        ("dc", "title", None),
        ("dc", "title", Some("alternative")),
        ("dc", "contributor", Some("author")),
        ("dc", "date", Some("issued")),
        ("dc", "description", Some("abstract")),
        ("dc", "subject", None),
        ("dc", "identifier", Some("doi")),
        ("dc", "identifier", Some("uri")),
        ("person", "identifier", Some("orcid")),
    ]
    .into_iter()
    .map(|(s, e, q)| FieldDefinition::new(s, e, q))
    .collect();

    let collections = [(THESES, "Theses"), (ARTICLES, "Articles"), (DATASETS, "Datasets")]
        .into_iter()
        .map(|(handle, name)| CollectionRef {
            handle: handle.to_string(),
            name: name.to_string(),
        })
        .collect();

    let thesis = item(
        THESIS_ID,
        "123456789/100",
        THESES,
        &[THESES, ARTICLES],
        vec![
            value("dc.title", "A Study of Things"),
            value("dc.title[fr]", "Une étude des choses"),
            value("dc.contributor.author", "Smith, J.").with_authority("rp00001", CONFIDENCE_ACCEPTED),
            value("dc.contributor.author", "Doe, A."),
            value("dc.subject", "Physics"),
            value("dc.subject", "Chemistry"),
            value("dc.description.abstract", "Line1\r\nLine2"),
            value("dc.date.issued", "2020"),
        ],
    );

    let person = item(
        PERSON_ID,
        "123456789/101",
        DATASETS,
        &[DATASETS],
        vec![
            value("dc.title", "Smith, John"),
            value("person.identifier.orcid", "0000-0002-1825-0097"),
        ],
    );

    let mut withdrawn = item(
        WITHDRAWN_ID,
        "123456789/102",
        ARTICLES,
        &[ARTICLES],
        vec![value("dc.title", "Retracted")],
    );
    withdrawn.withdrawn = true;

    RepositorySnapshot {
        fields,
        collections,
        items: vec![thesis, person, withdrawn],
        ..RepositorySnapshot::default()
    }
}

pub fn repository() -> MemoryRepository {
    MemoryRepository::from_snapshot(snapshot())
}

//! Export of current item state in the delimited-text format.
//!
//! The output parses back into lines that compute to empty change sets
//! against the same items:
//!
//! ```text
//! id,collection,dc.contributor.author,dc.title,dc.title[fr]
//! 0b5e…,123456789/1||123456789/2,"Smith, J.::rp00001::600||Doe, A.",A Study…,Une étude…
//! ```
//!
//! The owning collection is always written first.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::config::BulkEditConfig;
use crate::error::{CsvError, PipelineResult};
use crate::models::MetadataValue;
use crate::parser::{COLLECTION_HEADING, ID_HEADING};
use crate::store::ItemRepository;

/// Export every item of `collection`, or of the whole repository.
pub fn export_collection<R: ItemRepository + ?Sized>(
    repo: &R,
    collection: Option<&str>,
    config: &BulkEditConfig,
) -> PipelineResult<String> {
    let ids = repo.item_ids(collection)?;
    export_items(repo, &ids, config)
}

/// Export the given items, one row each, in the given order.
pub fn export_items<R: ItemRepository + ?Sized>(
    repo: &R,
    ids: &[Uuid],
    config: &BulkEditConfig,
) -> PipelineResult<String> {
    let value_sep = &config.separators.value;
    let authority_sep = &config.separators.authority;

    let mut rows = Vec::with_capacity(ids.len());
    let mut keys = BTreeSet::new();
    for &id in ids {
        let metadata = repo.all_metadata(id)?;
        keys.extend(metadata.iter().map(|v| v.field.key()));

        let owner = repo.owning_collection(id)?;
        let mut collections: Vec<String> = owner.iter().cloned().collect();
        collections.extend(
            repo.collections(id)?
                .into_iter()
                .filter(|h| Some(h) != owner.as_ref()),
        );
        rows.push((id, collections, metadata));
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(config.separators.delimiter()?)
        .from_writer(Vec::new());

    let mut header = vec![ID_HEADING.to_string(), COLLECTION_HEADING.to_string()];
    header.extend(keys.iter().cloned());
    writer.write_record(&header).map_err(CsvError::from)?;

    for (id, collections, metadata) in &rows {
        let mut record = vec![id.to_string(), collections.join(value_sep.as_str())];
        for key in &keys {
            let cell: Vec<String> = metadata
                .iter()
                .filter(|v| &v.field.key() == key)
                .map(|v| cell_value(v, config, authority_sep))
                .collect();
            record.push(cell.join(value_sep.as_str()));
        }
        writer.write_record(&record).map_err(CsvError::from)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Malformed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Encoding(e.to_string()).into())
}

fn cell_value(value: &MetadataValue, config: &BulkEditConfig, separator: &str) -> String {
    if config.is_authority_controlled(&value.field) && value.authority.is_some() {
        value.composite(separator)
    } else {
        value.value.clone()
    }
}

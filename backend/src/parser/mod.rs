//! Tabular document parsing.
//!
//! Turns a delimited-text document (or a workbook, see [`workbook`]) into
//! [`TabularLine`]s, validating every heading against the field catalog.
//!
//! ```text
//! id,collection,action,dc.title,dc.contributor.author
//! +,123456789/1,,"New Title","Smith, J.||Doe, A."
//! │ │           │ │           └── two values, split on "||"
//! │ │           │ └────────────── quoted, commas allowed
//! │ │           └──────────────── empty action
//! │ └──────────────────────────── owning collection first
//! └────────────────────────────── "+" = new item
//! ```
//!
//! Heading problems abort the whole parse ([`CsvError`]). Problems confined
//! to one row (an unknown action keyword) are collected in
//! [`TabularDocument::rejected`] and left to the batch policy.

pub mod field_key;
pub mod groups;
pub mod workbook;

pub use field_key::FieldKey;
pub use workbook::{parse_workbook, read_workbook, read_workbook_bytes, Sheet, Workbook, WorkbookOptions};

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::BulkEditConfig;
use crate::error::{CsvError, CsvResult, HeadingProblem, RowFailure};
use crate::models::{ItemIdentifier, LineAction, TabularLine};
use crate::store::FieldCatalog;

/// Reserved heading of the identifier column.
pub const ID_HEADING: &str = "id";
/// Reserved heading of the collection column.
pub const COLLECTION_HEADING: &str = "collection";
/// Reserved heading of the action column.
pub const ACTION_HEADING: &str = "action";

/// A parsed document.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularDocument {
    /// Effective headings, as written.
    pub headers: Vec<String>,
    pub lines: Vec<TabularLine>,
    /// Rows that failed row-level validation.
    pub rejected: Vec<RowFailure>,
    /// Detected or used encoding.
    pub encoding: String,
}

/// Meaning of one column.
#[derive(Debug, Clone)]
enum Column {
    Id,
    Collection,
    Action,
    Field(FieldKey),
    Blank,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Ok(text),
            Err(e) => {
                log::warn!("Invalid UTF-8 ({}), decoding lossily", e);
                Ok(String::from_utf8_lossy(bytes).to_string())
            }
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        // Fallback: UTF-8 with lossy conversion
        _ => Ok(String::from_utf8_lossy(bytes).to_string()),
    }
}

/// Parse raw bytes, detecting the encoding first.
pub fn parse_bytes_auto<C: FieldCatalog + ?Sized>(
    bytes: &[u8],
    config: &BulkEditConfig,
    catalog: &C,
) -> CsvResult<TabularDocument> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let mut document = parse_document(&content, config, catalog)?;
    document.encoding = encoding;
    Ok(document)
}

/// Whether a file name designates a workbook rather than delimited text.
pub fn is_workbook(name: &str) -> bool {
    let lower = name.to_lowercase();
    [".xlsx", ".xlsm", ".xlsb", ".xls", ".ods"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Load a document from disk, picking the format from the file extension.
pub fn load_document<C: FieldCatalog + ?Sized>(
    path: &Path,
    config: &BulkEditConfig,
    catalog: &C,
    options: &WorkbookOptions,
) -> CsvResult<TabularDocument> {
    if is_workbook(&path.to_string_lossy()) {
        let workbook = read_workbook(path)?;
        parse_workbook(&workbook, config, catalog, options)
    } else {
        let bytes = std::fs::read(path)?;
        parse_bytes_auto(&bytes, config, catalog)
    }
}

/// Load an uploaded document; `file_name` picks the format.
pub fn load_bytes<C: FieldCatalog + ?Sized>(
    bytes: &[u8],
    file_name: Option<&str>,
    config: &BulkEditConfig,
    catalog: &C,
    options: &WorkbookOptions,
) -> CsvResult<TabularDocument> {
    match file_name {
        Some(name) if is_workbook(name) => {
            let workbook = read_workbook_bytes(bytes.to_vec())?;
            parse_workbook(&workbook, config, catalog, options)
        }
        _ => parse_bytes_auto(bytes, config, catalog),
    }
}

/// Parse delimited text.
pub fn parse_document<C: FieldCatalog + ?Sized>(
    content: &str,
    config: &BulkEditConfig,
    catalog: &C,
) -> CsvResult<TabularDocument> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let delimiter = config
        .separators
        .delimiter()
        .map_err(|e| CsvError::Malformed(e.to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    // First non-empty record is the header row
    let header_record = loop {
        match records.next() {
            Some(record) => {
                let record = record?;
                if record.iter().any(|cell| !cell.trim().is_empty()) {
                    break record;
                }
            }
            None => return Err(CsvError::NoHeaders),
        }
    };

    let headers: Vec<String> = header_record
        .iter()
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .collect();
    let columns = classify_headings(&headers, None, config, catalog)?;

    let id_column = columns
        .iter()
        .position(|c| matches!(c, Column::Id))
        .ok_or(CsvError::MissingIdColumn(ID_HEADING))?;

    log::debug!("Headings: {}", headers.join(" | "));

    let mut document = TabularDocument {
        headers,
        encoding: "utf-8".to_string(),
        ..TabularDocument::default()
    };

    for record in records {
        let record = record?;
        let row = record
            .position()
            .map(|p| physical_line(content, p.byte()))
            .unwrap_or_default();

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        // Populated cells beyond the heading row
        if let Some(extra) = (columns.len()..record.len())
            .find(|&i| record.get(i).is_some_and(|c| !c.trim().is_empty()))
        {
            return Err(CsvError::MissingHeader {
                row,
                column: extra + 1,
            });
        }

        let raw_id = record.get(id_column).unwrap_or_default();
        let identifier = ItemIdentifier::parse(raw_id).ok_or_else(|| CsvError::InvalidIdentifier {
            row,
            value: raw_id.to_string(),
        })?;

        let mut line = TabularLine::new(row, identifier);
        let mut rejected = None;

        for (index, column) in columns.iter().enumerate() {
            // Missing trailing cells count as explicitly empty
            let cell = record.get(index).unwrap_or_default();
            match column {
                Column::Id => {}
                Column::Blank => {
                    if !cell.trim().is_empty() {
                        return Err(CsvError::MissingHeader {
                            row,
                            column: index + 1,
                        });
                    }
                }
                Column::Action => match LineAction::parse_csv(cell) {
                    Ok(action) => line.action = action,
                    Err(err) => rejected = Some(RowFailure::new(row, &err)),
                },
                Column::Collection => {
                    let handles = split_values(cell, &config.separators.value)
                        .into_iter()
                        .map(|h| h.trim().to_string())
                        .collect();
                    line.collections = Some(handles);
                }
                Column::Field(key) => {
                    line.push_values(key.normalized(), split_values(cell, &config.separators.value));
                }
            }
        }

        match rejected {
            Some(failure) => {
                log::debug!("Row {} rejected: {}", row, failure.message);
                document.rejected.push(failure);
            }
            None => document.lines.push(line),
        }
    }

    Ok(document)
}

/// 1-based line on which the record starting at `byte` begins.
///
/// The reader reports the offset before any skipped blank lines, and its own
/// line counter ignores them.
fn physical_line(content: &str, byte: u64) -> u64 {
    let bytes = content.as_bytes();
    let mut start = (byte as usize).min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\n' | b'\r') {
        start += 1;
    }
    bytes[..start].iter().filter(|&&b| b == b'\n').count() as u64 + 1
}

/// Split a cell on the value separator.
///
/// A blank cell gives an empty list. Blank fragments are dropped.
pub fn split_values(cell: &str, separator: &str) -> Vec<String> {
    if cell.trim().is_empty() {
        return Vec::new();
    }
    cell.split(separator)
        .filter(|fragment| !fragment.trim().is_empty())
        .map(String::from)
        .collect()
}

fn classify_headings<C: FieldCatalog + ?Sized>(
    headers: &[String],
    sheet: Option<&str>,
    config: &BulkEditConfig,
    catalog: &C,
) -> CsvResult<Vec<Column>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (index, heading) in headers.iter().enumerate() {
        let column_number = index + 1;
        let column = match heading.to_lowercase().as_str() {
            "" => Column::Blank,
            ID_HEADING => Column::Id,
            COLLECTION_HEADING => Column::Collection,
            ACTION_HEADING => Column::Action,
            _ => Column::Field(validate_heading(column_number, heading, config, catalog)?),
        };

        let normalized = match &column {
            Column::Blank => None,
            Column::Field(key) => Some(key.normalized()),
            _ => Some(heading.to_lowercase()),
        };
        if let Some(normalized) = normalized {
            if let Some(&first) = seen.get(&normalized) {
                return Err(CsvError::DuplicateHeader {
                    sheet: sheet.map(String::from),
                    heading: heading.clone(),
                    first,
                    second: column_number,
                });
            }
            seen.insert(normalized, column_number);
        }

        columns.push(column);
    }

    Ok(columns)
}

/// Check a metadata heading against the grammar, the configured authority
/// types and the field catalog. `column` is 1-indexed.
pub(crate) fn validate_heading<C: FieldCatalog + ?Sized>(
    column: usize,
    heading: &str,
    config: &BulkEditConfig,
    catalog: &C,
) -> CsvResult<FieldKey> {
    let invalid = |reason| CsvError::InvalidHeading {
        column,
        heading: heading.to_string(),
        reason,
    };

    let key = FieldKey::parse(heading).map_err(|_| invalid(HeadingProblem::Syntax))?;

    if let Some(authority) = &key.authority_type {
        if !config.is_authority_type(authority) {
            return Err(invalid(HeadingProblem::UnknownAuthorityType));
        }
    }
    if !catalog.has_schema(&key.field.schema) {
        return Err(invalid(HeadingProblem::UnknownSchema));
    }
    if catalog
        .resolve(
            &key.field.schema,
            &key.field.element,
            key.field.qualifier.as_deref(),
        )
        .is_none()
    {
        return Err(invalid(HeadingProblem::UnknownElement));
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    fn parse(content: &str) -> CsvResult<TabularDocument> {
        parse_document(content, &fixtures::config(), &fixtures::repository())
    }

    #[test]
    fn test_simple_document() {
        let doc = parse("id,collection,dc.title\n+,123456789/1,Hello\n").unwrap();
        assert_eq!(doc.headers, vec!["id", "collection", "dc.title"]);
        assert_eq!(doc.lines.len(), 1);

        let line = &doc.lines[0];
        assert_eq!(line.row, 2);
        assert_eq!(line.identifier, ItemIdentifier::New);
        assert_eq!(line.collections, Some(vec!["123456789/1".to_string()]));
        assert_eq!(line.values["dc.title"], vec!["Hello"]);
    }

    #[test]
    fn test_new_item_without_collection() {
        let doc = parse(
            "id,collection,dc.title,dc.contributor.author\n+,,\"New Title\",\"Smith, J.\"\n",
        )
        .unwrap();
        let line = &doc.lines[0];
        assert_eq!(line.collections, Some(vec![]));
        assert_eq!(line.values["dc.title"], vec!["New Title"]);
        assert_eq!(line.values["dc.contributor.author"], vec!["Smith, J."]);
    }

    #[test]
    fn test_quoted_multiline_and_escapes() {
        let doc = parse("id,dc.description.abstract\n+,\"Line1\r\nLine2, with \"\"quotes\"\"\"\n")
            .unwrap();
        assert_eq!(
            doc.lines[0].values["dc.description.abstract"],
            vec!["Line1\r\nLine2, with \"quotes\""]
        );
    }

    #[test]
    fn test_multi_values() {
        let doc = parse("id,dc.subject\n+,Physics|| ||Chemistry||\n").unwrap();
        assert_eq!(doc.lines[0].values["dc.subject"], vec!["Physics", "Chemistry"]);
    }

    #[test]
    fn test_trailing_empty_cell_is_explicit() {
        let id = fixtures::THESIS_ID;
        let doc = parse(&format!("id,dc.title,dc.subject\n{},Title,\n", id)).unwrap();
        assert_eq!(doc.lines[0].values["dc.subject"], Vec::<String>::new());

        // Short row: missing cells behave the same way
        let doc = parse(&format!("id,dc.title,dc.subject\n{},Title\n", id)).unwrap();
        assert!(doc.lines[0].values["dc.subject"].is_empty());
    }

    #[test]
    fn test_language_and_authority_headings() {
        let doc = parse("id,dc.title[fr],orcid:dc.contributor.author\n+,Titre,Smith\n").unwrap();
        let line = &doc.lines[0];
        assert_eq!(line.values["dc.title[fr]"], vec!["Titre"]);
        assert_eq!(line.values["orcid:dc.contributor.author"], vec!["Smith"]);
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = parse("id,dc.title,dc.subject,dc.title\n+,a,b,c\n").unwrap_err();
        match err {
            CsvError::DuplicateHeader { first, second, .. } => {
                assert_eq!((first, second), (2, 4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_schema_and_element() {
        let err = parse("id,foo.title\n+,a\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::InvalidHeading { column: 2, reason: HeadingProblem::UnknownSchema, .. }
        ));

        let err = parse("id,dc.colour\n+,a\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::InvalidHeading { reason: HeadingProblem::UnknownElement, .. }
        ));

        let err = parse("id,title\n+,a\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::InvalidHeading { reason: HeadingProblem::Syntax, .. }
        ));

        let err = parse("id,isni:dc.contributor.author\n+,a\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::InvalidHeading { reason: HeadingProblem::UnknownAuthorityType, .. }
        ));
    }

    #[test]
    fn test_populated_cell_without_heading() {
        let err = parse("id,dc.title\n+,a,stray\n").unwrap_err();
        assert!(matches!(err, CsvError::MissingHeader { row: 2, column: 3 }));

        // Trailing separator on the heading row with empty cells is fine
        let doc = parse("id,dc.title,\n+,a,\n").unwrap();
        assert_eq!(doc.lines.len(), 1);
    }

    #[test]
    fn test_invalid_identifier_is_fatal() {
        let err = parse("id,dc.title\n+,ok\n42,bad\n").unwrap_err();
        assert!(matches!(err, CsvError::InvalidIdentifier { row: 3, .. }));
    }

    #[test]
    fn test_unknown_action_rejects_row() {
        let id = fixtures::THESIS_ID;
        let doc = parse(&format!("id,action,dc.title\n{id},archive,a\n{id},withdraw,b\n")).unwrap();
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].action, LineAction::Withdraw);
        assert_eq!(doc.rejected.len(), 1);
        assert_eq!(doc.rejected[0].to_string(), "Row 2 - Unknown action: archive");
    }

    #[test]
    fn test_missing_id_column() {
        let err = parse("dc.title\nHello\n").unwrap_err();
        assert!(matches!(err, CsvError::MissingIdColumn(_)));
    }

    #[test]
    fn test_empty_and_blank_rows() {
        assert!(matches!(parse(""), Err(CsvError::EmptyFile)));
        let doc = parse("\nid,dc.title\n\n+,a\n,\n").unwrap();
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].row, 4);
    }

    #[test]
    fn test_rows_after_blank_lines_keep_file_lines() {
        let csv = format!(
            "id,action,dc.title\n{id},,a\n\n\r\n{id},merge,b\n{id},,\"two\nlines\"\n\n{id},merge,c\n",
            id = fixtures::THESIS_ID
        );
        let doc = parse(&csv).unwrap();

        assert_eq!(doc.lines.iter().map(|l| l.row).collect::<Vec<_>>(), vec![2, 6]);
        assert_eq!(
            doc.rejected.iter().map(|f| f.row).collect::<Vec<_>>(),
            vec![5, 9]
        );
        assert_eq!(physical_line("a\n\n\nb", 2), 4);
    }

    #[test]
    fn test_custom_separators() {
        let mut config = fixtures::config();
        config.separators.field = "tab".into();
        config.separators.value = ";".into();
        let doc = parse_document(
            "id\tdc.subject\n+\tA;B, C\n",
            &config,
            &fixtures::repository(),
        )
        .unwrap();
        assert_eq!(doc.lines[0].values["dc.subject"], vec!["A", "B, C"]);
    }

    #[test]
    fn test_latin1_bytes() {
        // "Société" in ISO-8859-1
        let mut bytes = b"id,dc.title\n+,Soci".to_vec();
        bytes.extend_from_slice(&[0xE9, 0x74, 0xE9, b'\n']);
        let doc =
            parse_bytes_auto(&bytes, &fixtures::config(), &fixtures::repository()).unwrap();
        assert!(doc.lines[0].values["dc.title"][0].starts_with("Soci"));
    }

    #[test]
    fn test_workbook_extension() {
        assert!(is_workbook("batch.XLSX"));
        assert!(is_workbook("batch.ods"));
        assert!(!is_workbook("batch.csv"));
    }
}

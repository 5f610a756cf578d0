//! Workbook (`.xlsx`, `.xls`, `.ods`) variant of the tabular format.
//!
//! # Layout
//!
//! - First sheet: one item per row. Headings `ID`, optional `ACTION`, then
//!   metadata fields. A blank `ID` means a new item.
//! - Other sheets: metadata groups keyed by `PARENT-ID` (see [`super::groups`]).
//! - A sheet named [`BITSTREAMS_SHEET`] describes files and is skipped.
//!
//! # Cell syntax
//!
//! ```text
//! value$$authority$$confidence$$sl-2 || second value
//! └─┬─┘  └───┬───┘  └───┬────┘ └─┬┘
//!   │        │          │        └── security level, validated then dropped
//!   │        │          └─────────── integer, defaults to 600 with an authority
//!   │        └────────────────────── authority key
//!   └─────────────────────────────── value
//! ```
//!
//! Values are rewritten into the delimited-text composite
//! (`value::authority::confidence`) so the reconciliation engine sees a single
//! format. New items are filed into [`WorkbookOptions::collection`]; existing
//! items keep their collections.

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use super::groups::{GroupAttacher, MetadataGroup, ParentRef, PLACEHOLDER_VALUE};
use super::{validate_heading, FieldKey, TabularDocument};
use crate::api::logs::log_warning;
use crate::config::BulkEditConfig;
use crate::error::{CsvError, CsvResult, RowError, RowFailure};
use crate::models::{ItemIdentifier, LineAction, TabularLine, CONFIDENCE_ACCEPTED};
use crate::store::FieldCatalog;

/// Reserved name of the file-description sheet.
pub const BITSTREAMS_SHEET: &str = "bitstream-metadata";
/// Separator of values within a cell.
pub const METADATA_SEPARATOR: &str = "||";
/// Separator of value attributes within a value.
pub const ATTRIBUTES_SEPARATOR: &str = "$$";
/// Prefix of the security-level attribute.
pub const SECURITY_LEVEL_PREFIX: &str = "sl-";

const ID_HEADING: &str = "ID";
const ACTION_HEADING: &str = "ACTION";
const DISCOVERABLE_HEADING: &str = "DISCOVERABLE";
const PARENT_ID_HEADING: &str = "PARENT-ID";

/// A sheet as rows of cell text. Row `n` of the sheet is `rows[n - 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<&str>>) -> Self {
        Self {
            name: name.into(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(String::from).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// Invocation-level settings for workbook imports.
#[derive(Debug, Clone, Default)]
pub struct WorkbookOptions {
    /// Handle of the collection new items are created in.
    pub collection: Option<String>,
}

/// Read every sheet of a workbook file.
pub fn read_workbook(path: &Path) -> CsvResult<Workbook> {
    let workbook = open_workbook_auto(path).map_err(|e| CsvError::Workbook(e.to_string()))?;
    collect_sheets(workbook)
}

/// Read an uploaded workbook.
pub fn read_workbook_bytes(bytes: Vec<u8>) -> CsvResult<Workbook> {
    let workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| CsvError::Workbook(e.to_string()))?;
    collect_sheets(workbook)
}

fn collect_sheets<RS: Read + Seek>(mut workbook: Sheets<RS>) -> CsvResult<Workbook> {
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| CsvError::Workbook(e.to_string()))?;

        // Ranges start at the first used cell; pad back to A1
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize];
        for cells in range.rows() {
            let mut row = vec![String::new(); first_col as usize];
            row.extend(cells.iter().map(cell_text));
            rows.push(row);
        }
        sheets.push(Sheet { name, rows });
    }
    Ok(Workbook { sheets })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Turn a workbook into tabular lines.
pub fn parse_workbook<C: FieldCatalog + ?Sized>(
    workbook: &Workbook,
    config: &BulkEditConfig,
    catalog: &C,
    options: &WorkbookOptions,
) -> CsvResult<TabularDocument> {
    let main = workbook.sheets.first().ok_or(CsvError::EmptyFile)?;
    let (header_index, headers) = header_row(main).ok_or(CsvError::NoHeaders)?;

    let columns = classify(&headers, &main.name, config, catalog)?;
    let id_column = columns
        .iter()
        .position(|c| matches!(c, SheetColumn::Id))
        .ok_or(CsvError::MissingIdColumn(ID_HEADING))?;

    let mut document = TabularDocument {
        headers: headers.clone(),
        encoding: "xlsx".to_string(),
        ..TabularDocument::default()
    };

    // Rejected main rows with their raw ID, so their groups are not reported twice
    let mut rejected_parents: Vec<(u64, String)> = Vec::new();
    for (index, cells) in main.rows.iter().enumerate().skip(header_index + 1) {
        let row = index as u64 + 1;
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        match read_main_row(row, cells, &columns, id_column, config, options) {
            Ok(line) => document.lines.push(line),
            Err(err) => {
                rejected_parents.push((row, cells.get(id_column).cloned().unwrap_or_default()));
                document
                    .rejected
                    .push(RowFailure::new(row, &err).in_sheet(main.name.clone()));
            }
        }
    }

    let mut group_failures = Vec::new();
    {
        let mut attacher = GroupAttacher::new(&mut document.lines);
        for (row, raw_id) in &rejected_parents {
            attacher.skip_rejected(*row, raw_id);
        }

        for sheet in workbook.sheets.iter().skip(1) {
            if sheet.name.eq_ignore_ascii_case(BITSTREAMS_SHEET) {
                log_warning(format!(
                    "Sheet {} - file descriptions are not imported, sheet skipped",
                    sheet.name
                ));
                continue;
            }
            let Some((header_index, headers)) = header_row(sheet) else {
                continue;
            };
            let columns = classify(&headers, &sheet.name, config, catalog)?;
            let parent_column = columns
                .iter()
                .position(|c| matches!(c, SheetColumn::ParentId))
                .ok_or(CsvError::MissingIdColumn(PARENT_ID_HEADING))?;

            for (index, cells) in sheet.rows.iter().enumerate().skip(header_index + 1) {
                let row = index as u64 + 1;
                if cells.iter().all(|c| c.trim().is_empty()) {
                    continue;
                }
                let attached = read_group_row(sheet, row, cells, &columns, parent_column, config)
                    .map_err(|err| RowFailure::new(row, &err).in_sheet(sheet.name.clone()))
                    .and_then(|group| attacher.attach(group));
                if let Err(failure) = attached {
                    group_failures.push(failure);
                }
            }
        }
    }
    document.rejected.extend(group_failures);

    Ok(document)
}

#[derive(Debug, Clone)]
enum SheetColumn {
    Id,
    Action,
    Discoverable,
    ParentId,
    Field(FieldKey),
    Blank,
}

fn header_row(sheet: &Sheet) -> Option<(usize, Vec<String>)> {
    sheet
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.iter().any(|c| !c.trim().is_empty()))
        .map(|(index, row)| (index, row.iter().map(|c| c.trim().to_string()).collect()))
}

fn classify<C: FieldCatalog + ?Sized>(
    headers: &[String],
    sheet: &str,
    config: &BulkEditConfig,
    catalog: &C,
) -> CsvResult<Vec<SheetColumn>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (index, heading) in headers.iter().enumerate() {
        let column_number = index + 1;
        let column = match heading.to_uppercase().as_str() {
            "" => SheetColumn::Blank,
            ID_HEADING => SheetColumn::Id,
            ACTION_HEADING => SheetColumn::Action,
            DISCOVERABLE_HEADING => SheetColumn::Discoverable,
            PARENT_ID_HEADING => SheetColumn::ParentId,
            _ => SheetColumn::Field(validate_heading(column_number, heading, config, catalog)?),
        };

        let normalized = match &column {
            SheetColumn::Blank => None,
            SheetColumn::Field(key) => Some(key.normalized()),
            _ => Some(heading.to_uppercase()),
        };
        if let Some(normalized) = normalized {
            if let Some(&first) = seen.get(&normalized) {
                return Err(CsvError::DuplicateHeader {
                    sheet: Some(sheet.to_string()),
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

fn read_main_row(
    row: u64,
    cells: &[String],
    columns: &[SheetColumn],
    id_column: usize,
    config: &BulkEditConfig,
    options: &WorkbookOptions,
) -> Result<TabularLine, RowError> {
    let cell = |index: usize| cells.get(index).map(String::as_str).unwrap_or_default();

    let mut action = LineAction::NotSpecified;
    if let Some(index) = columns.iter().position(|c| matches!(c, SheetColumn::Action)) {
        action = LineAction::parse_sheet(cell(index))?;
    }

    let raw_id = cell(id_column).trim();
    let identifier = if raw_id.is_empty() {
        ItemIdentifier::New
    } else {
        ItemIdentifier::parse(raw_id)
            .filter(|id| !id.is_new())
            .ok_or_else(|| RowError::InvalidIdentifier(raw_id.to_string()))?
    };

    if action == LineAction::NotSpecified {
        action = if identifier.is_new() {
            LineAction::Add
        } else {
            LineAction::Update
        };
    }

    let mut line = TabularLine::new(row, identifier);
    line.action = action;
    if line.identifier.is_new() {
        line.collections = options.collection.clone().map(|c| vec![c]);
    }

    for (index, column) in columns.iter().enumerate() {
        match column {
            SheetColumn::Field(key) => {
                let mut values = Vec::new();
                for raw in super::split_values(cell(index), METADATA_SEPARATOR) {
                    values.push(convert_value(key, &raw, config)?);
                }
                line.push_values(key.normalized(), values);
            }
            SheetColumn::Discoverable => {
                if !cell(index).trim().is_empty() {
                    log::debug!("Row {}: DISCOVERABLE is not applied", row);
                }
            }
            _ => {}
        }
    }

    Ok(line)
}

fn read_group_row(
    sheet: &Sheet,
    row: u64,
    cells: &[String],
    columns: &[SheetColumn],
    parent_column: usize,
    config: &BulkEditConfig,
) -> Result<MetadataGroup, RowError> {
    let cell = |index: usize| cells.get(index).map(String::as_str).unwrap_or_default();

    let raw_parent = cell(parent_column);
    if raw_parent.trim().is_empty() {
        return Err(RowError::MissingParentId);
    }
    let parent =
        ParentRef::parse(raw_parent).ok_or_else(|| RowError::InvalidParentId(raw_parent.to_string()))?;

    let mut values = Vec::new();
    for (index, column) in columns.iter().enumerate() {
        let SheetColumn::Field(key) = column else {
            continue;
        };
        let parts = super::split_values(cell(index), METADATA_SEPARATOR);
        let value = match parts.as_slice() {
            [] => PLACEHOLDER_VALUE.to_string(),
            [single] => convert_value(key, single, config)?,
            _ => return Err(RowError::MultipleGroupValues),
        };
        values.push((key.normalized(), value));
    }

    Ok(MetadataGroup {
        sheet: sheet.name.clone(),
        row,
        parent,
        values,
    })
}

/// Rewrite `value$$authority$$confidence$$sl-N` as the composite understood by
/// the reconciliation engine.
fn convert_value(key: &FieldKey, raw: &str, config: &BulkEditConfig) -> Result<String, RowError> {
    let invalid = |message: &str| RowError::InvalidValue {
        field: key.normalized(),
        value: raw.to_string(),
        message: message.to_string(),
    };

    let mut sections: Vec<&str> = raw.split(ATTRIBUTES_SEPARATOR).collect();
    if sections.len() > 4 {
        return Err(invalid("too many '$$' sections"));
    }

    if let Some(last) = sections.last() {
        if sections.len() > 1 && last.trim().starts_with(SECURITY_LEVEL_PREFIX) {
            let level = last.trim().trim_start_matches(SECURITY_LEVEL_PREFIX);
            if level.parse::<u32>().is_err() {
                return Err(invalid("security level must be 'sl-' followed by a number"));
            }
            sections.pop();
        }
    }

    let sep = &config.separators.authority;
    match sections.as_slice() {
        [value] => Ok(value.to_string()),
        [value, authority] if authority.trim().is_empty() => Ok(value.to_string()),
        [value, authority] => Ok(format!(
            "{}{sep}{}{sep}{}",
            value,
            authority.trim(),
            CONFIDENCE_ACCEPTED,
            sep = sep
        )),
        [value, authority, confidence] => {
            let confidence: i32 = confidence
                .trim()
                .parse()
                .map_err(|_| invalid("confidence must be an integer"))?;
            if authority.trim().is_empty() {
                return Ok(value.to_string());
            }
            Ok(format!("{}{sep}{}{sep}{}", value, authority.trim(), confidence, sep = sep))
        }
        _ => Err(invalid("too many '$$' sections")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemIdentifier;
    use crate::store::fixtures;

    fn options() -> WorkbookOptions {
        WorkbookOptions {
            collection: Some(fixtures::THESES.to_string()),
        }
    }

    fn parse(workbook: &Workbook) -> CsvResult<TabularDocument> {
        parse_workbook(workbook, &fixtures::config(), &fixtures::repository(), &options())
    }

    fn key(raw: &str) -> FieldKey {
        FieldKey::parse(raw).unwrap()
    }

    #[test]
    fn test_convert_value() {
        let config = fixtures::config();
        let author = key("dc.contributor.author");
        assert_eq!(convert_value(&author, "Smith", &config).unwrap(), "Smith");
        assert_eq!(
            convert_value(&author, "Smith$$rp01", &config).unwrap(),
            "Smith::rp01::600"
        );
        assert_eq!(
            convert_value(&author, "Smith$$rp01$$300$$sl-1", &config).unwrap(),
            "Smith::rp01::300"
        );
        assert_eq!(convert_value(&author, "Smith$$sl-2", &config).unwrap(), "Smith");
        assert!(convert_value(&author, "Smith$$rp01$$high", &config).is_err());
        assert!(convert_value(&author, "a$$b$$1$$sl-x", &config).is_err());
        assert!(convert_value(&author, "a$$b$$1$$2$$3", &config).is_err());
    }

    #[test]
    fn test_main_sheet() {
        let id = fixtures::THESIS_ID.to_string();
        let workbook = Workbook {
            sheets: vec![Sheet::new(
                "items",
                vec![
                    vec!["ID", "ACTION", "dc.title", "dc.subject"],
                    vec!["", "", "New paper", "A||B"],
                    vec![id.as_str(), "UPDATE", "Renamed", ""],
                    vec!["", "", "", ""],
                ],
            )],
        };

        let doc = parse(&workbook).unwrap();
        assert_eq!(doc.lines.len(), 2);

        let new = &doc.lines[0];
        assert_eq!(new.row, 2);
        assert_eq!(new.identifier, ItemIdentifier::New);
        assert_eq!(new.action, LineAction::Add);
        assert_eq!(new.collections, Some(vec![fixtures::THESES.to_string()]));
        assert_eq!(new.values["dc.subject"], vec!["A", "B"]);

        let existing = &doc.lines[1];
        assert_eq!(existing.action, LineAction::Update);
        assert_eq!(existing.collections, None);
        assert!(existing.values["dc.subject"].is_empty());
    }

    #[test]
    fn test_invalid_rows_are_rejected() {
        let workbook = Workbook {
            sheets: vec![Sheet::new(
                "items",
                vec![
                    vec!["ID", "ACTION", "dc.title"],
                    vec!["", "MERGE", "x"],
                    vec!["not-an-id", "", "y"],
                    vec!["", "ADD", "ok"],
                ],
            )],
        };

        let doc = parse(&workbook).unwrap();
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.rejected.len(), 2);
        assert!(doc.rejected[0].to_string().starts_with("Sheet items - Row 2 - Invalid action MERGE"));
        assert_eq!(
            doc.rejected[1].to_string(),
            "Sheet items - Row 3 - Invalid item identifier 'not-an-id'"
        );
    }

    #[test]
    fn test_groups_of_rejected_rows_are_not_reported_again() {
        let id = fixtures::THESIS_ID.to_string();
        let upper = id.to_uppercase();
        let person = fixtures::PERSON_ID.to_string();
        let person_upper = person.to_uppercase();
        let workbook = Workbook {
            sheets: vec![
                Sheet::new(
                    "items",
                    vec![
                        vec!["ID", "ACTION", "dc.title"],
                        vec![id.as_str(), "MERGE", "x"],
                        vec![person.as_str(), "", "y"],
                    ],
                ),
                Sheet::new(
                    "authors",
                    vec![
                        vec!["PARENT-ID", "dc.contributor.author"],
                        vec![upper.as_str(), "Lost, A."],
                        vec!["ROW-ID::2", "Lost, B."],
                        vec![person_upper.as_str(), "Roe, B."],
                    ],
                ),
            ],
        };

        let doc = parse(&workbook).unwrap();
        assert_eq!(doc.rejected.len(), 1);
        assert_eq!(doc.rejected[0].row, 2);
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].values["dc.contributor.author"], vec!["Roe, B."]);
    }

    #[test]
    fn test_metadata_groups() {
        let id = fixtures::THESIS_ID.to_string();
        let workbook = Workbook {
            sheets: vec![
                Sheet::new(
                    "items",
                    vec![
                        vec!["ID", "dc.title"],
                        vec!["", "New paper"],
                        vec![id.as_str(), "Existing"],
                    ],
                ),
                Sheet::new(
                    "authors",
                    vec![
                        vec!["PARENT-ID", "dc.contributor.author", "dc.subject"],
                        vec!["ROW-ID::2", "Smith, J.$$rp01", "Physics"],
                        vec!["ROW-ID::2", "Doe, A.", ""],
                        vec![id.as_str(), "Roe, B.", "Maths"],
                        vec!["", "Orphan", ""],
                        vec!["ROW-ID::2", "X||Y", ""],
                        vec!["ROW-ID::40", "Lost", ""],
                    ],
                ),
                Sheet::new(BITSTREAMS_SHEET, vec![vec!["PARENT-ID", "FILE-PATH"]]),
            ],
        };

        let doc = parse(&workbook).unwrap();
        let new = &doc.lines[0];
        assert_eq!(
            new.values["dc.contributor.author"],
            vec!["Smith, J.::rp01::600", "Doe, A."]
        );
        assert_eq!(new.values["dc.subject"], vec!["Physics", PLACEHOLDER_VALUE]);
        assert_eq!(doc.lines[1].values["dc.contributor.author"], vec!["Roe, B."]);

        let messages: Vec<String> = doc.rejected.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "Sheet authors - Row 5 - No PARENT-ID set".to_string(),
                "Sheet authors - Row 6 - Multiple metadata value on the same cell not allowed in the metadata group sheets".to_string(),
                "Sheet authors - Row 7 - Invalid PARENT-ID 'ROW-ID::40'".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_headers_name_the_sheet() {
        let workbook = Workbook {
            sheets: vec![Sheet::new(
                "items",
                vec![vec!["ID", "dc.title", "dc.title"], vec!["", "a", "b"]],
            )],
        };
        let err = parse(&workbook).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sheet items - Duplicated headers found on cells 2 and 3 ('dc.title')"
        );
    }

    #[test]
    fn test_group_sheet_requires_parent_column() {
        let workbook = Workbook {
            sheets: vec![
                Sheet::new("items", vec![vec!["ID", "dc.title"], vec!["", "a"]]),
                Sheet::new("authors", vec![vec!["dc.contributor.author"], vec!["x"]]),
            ],
        };
        assert!(matches!(parse(&workbook), Err(CsvError::MissingIdColumn("PARENT-ID"))));
    }

    #[test]
    fn test_read_workbook_missing_file() {
        let err = read_workbook(Path::new("/nonexistent/batch.xlsx")).unwrap_err();
        assert!(matches!(err, CsvError::Workbook(_)));
    }
}

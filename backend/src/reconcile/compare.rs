//! Change computation: diff one row against the current item.
//!
//! For every field column the desired values are matched against the
//! item's current values of exactly that field (language included):
//!
//! ```text
//! current:  [Physics, Chemistry]        desired: [Physics, Biology]
//!              │         │                          │        │
//!              └─ constant                          │        └─ add
//!                        └─ remove                  └─ matched
//! ```
//!
//! Values are compared on their normalized text: line endings folded to
//! `\n`, surrounding whitespace trimmed. Authority-controlled fields compare
//! `value::authority::confidence` when an authority is present; other fields
//! drop everything from the authority separator on.
//!
//! Each current value matches at most one desired value, so duplicates on
//! either side are counted.

use uuid::Uuid;

use crate::config::BulkEditConfig;
use crate::error::RowError;
use crate::models::{
    ChangeSet, CollectionRef, ItemIdentifier, ItemState, ItemSummary, LineAction, MetadataField,
    MetadataValue, SubmissionMode, TabularLine, CONFIDENCE_ACCEPTED,
};
use crate::parser::FieldKey;
use crate::store::ItemRepository;

/// Authority written for values coming from a `type:` column.
pub const GENERATED_AUTHORITY: &str = "will be generated";

/// Fold CRLF and CR to LF and trim.
pub fn normalize_text(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// What a row's identifier resolved to.
enum Target {
    New {
        /// Unresolved typed reference, recorded on the new item.
        reference: Option<(MetadataField, String)>,
    },
    Existing(ItemSummary),
}

/// Computes one [`ChangeSet`] per [`TabularLine`].
pub struct ChangeComputer<'a> {
    config: &'a BulkEditConfig,
}

impl<'a> ChangeComputer<'a> {
    pub fn new(config: &'a BulkEditConfig) -> Self {
        Self { config }
    }

    pub fn compute<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        line: &TabularLine,
    ) -> Result<ChangeSet, RowError> {
        match self.resolve_target(repo, line)? {
            Target::New { reference } => self.compute_new(repo, line, reference),
            Target::Existing(item) => self.compute_existing(repo, line, item),
        }
    }

    fn resolve_target<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        line: &TabularLine,
    ) -> Result<Target, RowError> {
        let action = line.action;

        if line.identifier.is_new() {
            return match action {
                LineAction::NotSpecified | LineAction::Add | LineAction::AddArchive | LineAction::AddWorkspace => {
                    Ok(Target::New { reference: None })
                }
                LineAction::Update | LineAction::UpdateWorkflow | LineAction::UpdateArchive | LineAction::Delete => {
                    Err(RowError::MissingIdentifier)
                }
                LineAction::Expunge | LineAction::Withdraw | LineAction::Reinstate => {
                    Err(RowError::ActionOnNewItem(action.as_str().to_string()))
                }
            };
        }

        if action.is_adding() {
            return Err(RowError::AddWithIdentifier);
        }

        match &line.identifier {
            ItemIdentifier::Id(id) => repo
                .find_item(*id)?
                .map(Target::Existing)
                .ok_or_else(|| RowError::UnknownItem(id.to_string())),
            ItemIdentifier::Reference { prefix, value } => {
                let field = self
                    .config
                    .reference_field(prefix)
                    .ok_or_else(|| RowError::UnknownReferenceType(prefix.clone()))?;
                match repo.find_by_reference(&field, value)? {
                    Some(item) => Ok(Target::Existing(item)),
                    None if action == LineAction::NotSpecified => Ok(Target::New {
                        reference: Some((field, value.clone())),
                    }),
                    None => Err(RowError::UnknownItem(line.identifier.to_string())),
                }
            }
            ItemIdentifier::New => Ok(Target::New { reference: None }),
        }
    }

    fn compute_new<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        line: &TabularLine,
        reference: Option<(MetadataField, String)>,
    ) -> Result<ChangeSet, RowError> {
        let mut change = ChangeSet::for_new_item(line.row);

        let handles = line.collections.as_deref().unwrap_or_default();
        if handles.is_empty() {
            return Err(RowError::MissingCollection);
        }
        let collections = resolve_collections(repo, handles)?;
        let mut collections = collections.into_iter();
        if let Some(owner) = collections.next() {
            change.change_owning_collection(None, owner);
        }
        for mapped in collections {
            change.register_new_mapped(mapped);
        }

        change.submission = Some(match line.action {
            LineAction::AddArchive => SubmissionMode::Archive,
            LineAction::AddWorkspace => SubmissionMode::Workspace,
            _ if self.config.use_workflow => SubmissionMode::Workflow,
            _ => SubmissionMode::Archive,
        });

        for (key, values) in plain_columns_first(line) {
            self.compare_field(repo, None, key, values, &mut change)?;
        }

        if let Some((field, value)) = reference {
            let present = change
                .complete_for(&field)
                .any(|v| normalize_text(&v.value) == normalize_text(&value));
            if !present {
                change.register_add(MetadataValue::new(field, value));
            }
        }

        Ok(change)
    }

    fn compute_existing<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        line: &TabularLine,
        item: ItemSummary,
    ) -> Result<ChangeSet, RowError> {
        let mut change = ChangeSet::for_item(line.row, item.clone());

        match line.action {
            LineAction::Expunge | LineAction::Delete => {
                if !self.config.allow_expunge {
                    return Err(RowError::ExpungeDenied(line.action.as_str().to_string()));
                }
                change.deleted = true;
                return Ok(change);
            }
            LineAction::Withdraw if !item.withdrawn => change.withdrawn = true,
            LineAction::Reinstate if item.withdrawn => change.reinstated = true,
            LineAction::UpdateArchive if item.state != ItemState::Archived => {
                change.submission = Some(SubmissionMode::Archive);
            }
            LineAction::UpdateWorkflow if item.state == ItemState::Workspace => {
                change.submission = Some(SubmissionMode::Workflow);
            }
            _ => {}
        }

        if let Some(handles) = &line.collections {
            self.compare_collections(repo, &item, handles, &mut change)?;
        }

        for (key, values) in plain_columns_first(line) {
            self.compare_field(repo, Some(item.id), key, values, &mut change)?;
        }

        Ok(change)
    }

    fn compare_collections<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        item: &ItemSummary,
        handles: &[String],
        change: &mut ChangeSet,
    ) -> Result<(), RowError> {
        if handles.is_empty() {
            return Err(RowError::EmptyCollection(item.id.to_string()));
        }
        let wanted = resolve_collections(repo, handles)?;
        let new_owner = wanted[0].clone();

        // Owner is read explicitly, never inferred from membership order
        let current_owner = repo.owning_collection(item.id)?;
        let mapped_now: Vec<String> = repo
            .collections(item.id)?
            .into_iter()
            .filter(|h| Some(h) != current_owner.as_ref())
            .collect();

        log::debug!(
            "Item {}: owner {:?}, mapped {:?}, wanted {:?}",
            item.id,
            current_owner,
            mapped_now,
            handles
        );

        let old_owner = match &current_owner {
            Some(handle) => Some(describe_collection(repo, handle)?),
            None => None,
        };
        change.change_owning_collection(old_owner, new_owner.clone());

        for collection in wanted.iter().skip(1) {
            if !mapped_now.contains(&collection.handle) {
                change.register_new_mapped(collection.clone());
            }
        }

        for handle in &mapped_now {
            if handle != &new_owner.handle && !handles.contains(handle) {
                change.register_old_mapped(describe_collection(repo, handle)?);
            }
        }

        Ok(())
    }

    fn compare_field<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        item: Option<Uuid>,
        key: &str,
        values: &[String],
        change: &mut ChangeSet,
    ) -> Result<(), RowError> {
        let key = FieldKey::parse(key).map_err(|e| RowError::InvalidValue {
            field: key.to_string(),
            value: String::new(),
            message: e.to_string(),
        })?;
        let field = &key.field;

        let current = match item {
            Some(id) => repo.metadata(id, field)?,
            None => Vec::new(),
        };

        if let Some(authority_type) = &key.authority_type {
            self.compare_authority_column(field, authority_type, values, &current, change);
            return Ok(());
        }

        let controlled = self.config.is_authority_controlled(field);
        change.register_replaced(field);

        let current_keys: Vec<String> = current.iter().map(|v| self.comparison_key(v, controlled)).collect();
        let mut matched = vec![false; current.len()];

        log::debug!("Field {}: looking for {:?}, found {:?}", field, values, current_keys);

        for raw in values {
            let desired = self.desired_value(field, raw, controlled);
            if desired.value.is_empty() {
                continue;
            }
            let desired_key = self.comparison_key(&desired, controlled);
            let hit = (0..current.len()).find(|&i| !matched[i] && current_keys[i] == desired_key);
            match hit {
                Some(i) => {
                    matched[i] = true;
                    change.register_constant(current[i].clone());
                }
                None => change.register_add(desired),
            }
        }

        for (value, _) in current.into_iter().zip(matched).filter(|(_, m)| !m) {
            log::debug!("Field {}: removing {:?}", field, value.value);
            change.register_remove(value);
        }

        Ok(())
    }

    /// Columns headed `type:schema.element` only ever add.
    fn compare_authority_column(
        &self,
        field: &MetadataField,
        authority_type: &str,
        values: &[String],
        current: &[MetadataValue],
        change: &mut ChangeSet,
    ) {
        let sep = &self.config.separators.authority;
        for raw in values {
            let text = normalize_text(raw);
            if text.is_empty() {
                continue;
            }
            let present = current
                .iter()
                .chain(change.complete_for(field))
                .any(|v| normalize_text(&v.value) == text);
            if present {
                continue;
            }
            let authority = format!("{GENERATED_AUTHORITY}{sep}{authority_type}{sep}{text}");
            change.register_add(
                MetadataValue::new(field.clone(), text).with_authority(authority, CONFIDENCE_ACCEPTED),
            );
        }
    }

    /// Parse a cell value into the value it would be stored as.
    fn desired_value(&self, field: &MetadataField, raw: &str, controlled: bool) -> MetadataValue {
        let sep = &self.config.separators.authority;
        let text = normalize_text(raw);

        if !controlled {
            let value = text.split(sep.as_str()).next().unwrap_or_default();
            return MetadataValue::new(field.clone(), normalize_text(value));
        }

        // value[::more]::authority::confidence, confidence must be numeric
        let parts: Vec<&str> = text.split(sep.as_str()).collect();
        if parts.len() >= 3 {
            if let Ok(confidence) = parts[parts.len() - 1].trim().parse::<i32>() {
                let authority = parts[parts.len() - 2].trim();
                let value = normalize_text(&parts[..parts.len() - 2].join(sep.as_str()));
                let desired = MetadataValue::new(field.clone(), value);
                return if authority.is_empty() {
                    desired
                } else {
                    desired.with_authority(authority, confidence)
                };
            }
        }
        MetadataValue::new(field.clone(), text)
    }

    fn comparison_key(&self, value: &MetadataValue, controlled: bool) -> String {
        let sep = &self.config.separators.authority;
        if controlled && value.authority.is_some() {
            normalize_text(&value.composite(sep))
        } else if controlled {
            normalize_text(&value.value)
        } else {
            let text = normalize_text(&value.value);
            normalize_text(text.split(sep.as_str()).next().unwrap_or_default())
        }
    }
}

fn resolve_collections<R: ItemRepository + ?Sized>(
    repo: &R,
    handles: &[String],
) -> Result<Vec<CollectionRef>, RowError> {
    let mut resolved: Vec<CollectionRef> = Vec::with_capacity(handles.len());
    for handle in handles {
        let collection = repo
            .find_collection(handle)?
            .ok_or_else(|| RowError::NotACollection(handle.clone()))?;
        if resolved.iter().any(|c| c.handle == collection.handle) {
            return Err(RowError::DuplicateCollection(handle.clone()));
        }
        resolved.push(collection);
    }
    Ok(resolved)
}

/// Current collection for reporting; a dangling handle is shown as-is.
fn describe_collection<R: ItemRepository + ?Sized>(
    repo: &R,
    handle: &str,
) -> Result<CollectionRef, RowError> {
    Ok(repo.find_collection(handle)?.unwrap_or_else(|| CollectionRef {
        handle: handle.to_string(),
        name: handle.to_string(),
    }))
}

/// Metadata columns with `type:` columns last, so those see every plain
/// value of the row.
fn plain_columns_first(line: &TabularLine) -> Vec<(&str, &[String])> {
    let (mut plain, authority): (Vec<_>, Vec<_>) = line
        .values
        .iter()
        .map(|(key, values)| (key.as_str(), values.as_slice()))
        .partition(|(key, _)| {
            !FieldKey::parse(key)
                .map(|k| k.is_authority_column())
                .unwrap_or(false)
        });
    plain.extend(authority);
    plain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use crate::store::fixtures::{self, field, value, ARTICLES, DATASETS, THESES, THESIS_ID};
    use crate::store::MemoryRepository;

    fn line(id: &str, values: &[(&str, &str)]) -> TabularLine {
        let mut line = TabularLine::new(2, ItemIdentifier::parse(id).unwrap());
        for (key, cell) in values {
            line.values
                .insert(key.to_string(), crate::parser::split_values(cell, "||"));
        }
        line
    }

    fn thesis(values: &[(&str, &str)]) -> TabularLine {
        line(&THESIS_ID.to_string(), values)
    }

    fn compute(line: &TabularLine) -> Result<ChangeSet, RowError> {
        let config = fixtures::config();
        ChangeComputer::new(&config).compute(&fixtures::repository(), line)
    }

    fn texts(values: &[MetadataValue]) -> Vec<&str> {
        values.iter().map(|v| v.value.as_str()).collect()
    }

    #[test]
    fn test_new_item_without_collection_fails() {
        let repo = fixtures::repository();
        let config = fixtures::config();
        let doc = parse_document(
            "id,collection,dc.title,dc.contributor.author\n+,,\"New Title\",\"Smith, J.\"\n",
            &config,
            &repo,
        )
        .unwrap();

        let err = ChangeComputer::new(&config).compute(&repo, &doc.lines[0]).unwrap_err();
        assert!(matches!(err, RowError::MissingCollection));
    }

    #[test]
    fn test_new_item_adds_everything() {
        let mut new = line("+", &[("dc.title", "New Title"), ("dc.contributor.author", "Smith, J.")]);
        new.collections = Some(vec![THESES.into(), ARTICLES.into()]);

        let change = compute(&new).unwrap();
        assert!(change.new_item);
        assert!(change.removes.is_empty());
        assert_eq!(change.adds.len(), 2);
        assert!(change.adds.contains(&value("dc.title", "New Title")));
        assert!(change.adds.contains(&value("dc.contributor.author", "Smith, J.")));
        assert_eq!(change.new_owning_collection.as_ref().unwrap().handle, THESES);
        assert_eq!(change.old_owning_collection, None);
        assert_eq!(change.new_mapped_collections[0].handle, ARTICLES);
        assert_eq!(change.submission, Some(SubmissionMode::Archive));
    }

    #[test]
    fn test_new_item_rejects_action() {
        let mut new = line("+", &[("dc.title", "T")]);
        new.collections = Some(vec![THESES.into()]);
        new.action = LineAction::Withdraw;
        let err = compute(&new).unwrap_err();
        assert_eq!(err.to_string(), "'withdraw' not allowed for new items!");
    }

    #[test]
    fn test_new_item_collection_errors() {
        let mut new = line("+", &[]);
        new.collections = Some(vec!["123456789/99".into()]);
        assert!(matches!(compute(&new), Err(RowError::NotACollection(_))));

        new.collections = Some(vec![THESES.into(), THESES.into()]);
        assert!(matches!(compute(&new), Err(RowError::DuplicateCollection(_))));

        new.collections = None;
        assert!(matches!(compute(&new), Err(RowError::MissingCollection)));
    }

    #[test]
    fn test_submission_modes() {
        let mut new = line("+", &[]);
        new.collections = Some(vec![THESES.into()]);

        new.action = LineAction::AddWorkspace;
        assert_eq!(compute(&new).unwrap().submission, Some(SubmissionMode::Workspace));

        let mut config = fixtures::config();
        config.use_workflow = true;
        new.action = LineAction::Add;
        let change = ChangeComputer::new(&config)
            .compute(&fixtures::repository(), &new)
            .unwrap();
        assert_eq!(change.submission, Some(SubmissionMode::Workflow));

        new.action = LineAction::AddArchive;
        let change = ChangeComputer::new(&config)
            .compute(&fixtures::repository(), &new)
            .unwrap();
        assert_eq!(change.submission, Some(SubmissionMode::Archive));
    }

    #[test]
    fn test_add_and_remove() {
        let change = compute(&thesis(&[("dc.subject", "Physics||Biology")])).unwrap();
        assert_eq!(texts(&change.adds), vec!["Biology"]);
        assert_eq!(texts(&change.removes), vec!["Chemistry"]);
        assert_eq!(texts(&change.constant), vec!["Physics"]);
        assert_eq!(texts(&change.complete), vec!["Physics", "Biology"]);
        assert_eq!(change.replaced_fields, vec![field("dc.subject")]);
    }

    #[test]
    fn test_unchanged_row_has_no_changes() {
        let change = compute(&thesis(&[
            ("dc.title", "A Study of Things"),
            ("dc.subject", "Chemistry||Physics"),
            ("dc.contributor.author", "Smith, J.::rp00001::600||Doe, A."),
        ]))
        .unwrap();
        assert!(!change.has_changes());
        assert_eq!(change.constant.len(), 5);
    }

    #[test]
    fn test_empty_cell_clears_field() {
        let change = compute(&thesis(&[("dc.subject", "")])).unwrap();
        assert_eq!(texts(&change.removes), vec!["Physics", "Chemistry"]);
        assert!(change.adds.is_empty());
    }

    #[test]
    fn test_duplicates_are_counted() {
        let change = compute(&thesis(&[("dc.subject", "Physics||Physics||Chemistry")])).unwrap();
        assert_eq!(texts(&change.adds), vec!["Physics"]);
        assert!(change.removes.is_empty());
    }

    #[test]
    fn test_crlf_insensitive() {
        let change = compute(&thesis(&[("dc.description.abstract", "Line1\nLine2")])).unwrap();
        assert!(!change.has_changes());
        // The stored text is kept as it was
        assert_eq!(change.complete[0].value, "Line1\r\nLine2");
    }

    #[test]
    fn test_language_isolation() {
        let change = compute(&thesis(&[("dc.title[en]", "English title")])).unwrap();
        assert_eq!(change.adds, vec![value("dc.title[en]", "English title")]);
        assert!(change.removes.is_empty());

        let change = compute(&thesis(&[("dc.title[fr]", "Nouveau titre")])).unwrap();
        assert!(change.adds.iter().chain(&change.removes).all(|v| v.field == field("dc.title[fr]")));
        assert_eq!(texts(&change.removes), vec!["Une étude des choses"]);
    }

    #[test]
    fn test_controlled_field_compares_authority() {
        // Same text, authority dropped: remove the old statement, add the new one
        let change = compute(&thesis(&[("dc.contributor.author", "Smith, J.||Doe, A.")])).unwrap();
        assert_eq!(texts(&change.adds), vec!["Smith, J."]);
        assert_eq!(change.removes[0].authority.as_deref(), Some("rp00001"));

        let change = compute(&thesis(&[("dc.contributor.author", "Smith, J.::rp00002::500||Doe, A.")])).unwrap();
        assert_eq!(change.adds[0].authority.as_deref(), Some("rp00002"));
        assert_eq!(change.adds[0].confidence, 500);
    }

    #[test]
    fn test_uncontrolled_field_ignores_authority() {
        let change = compute(&thesis(&[("dc.subject", "Physics::x::600||Chemistry")])).unwrap();
        assert!(!change.has_changes());
    }

    #[test]
    fn test_authority_column_only_adds() {
        let change = compute(&thesis(&[("orcid:dc.contributor.author", "")])).unwrap();
        assert!(!change.has_changes());

        let change = compute(&thesis(&[
            ("dc.contributor.author", "Smith, J.::rp00001::600||Doe, A."),
            ("orcid:dc.contributor.author", "Roe, B.||Doe, A."),
        ]))
        .unwrap();
        assert!(change.removes.is_empty());
        assert_eq!(texts(&change.adds), vec!["Roe, B."]);
        assert_eq!(
            change.adds[0].authority.as_deref(),
            Some("will be generated::orcid::Roe, B.")
        );
        assert_eq!(change.adds[0].confidence, CONFIDENCE_ACCEPTED);
    }

    #[test]
    fn test_authority_column_sorting_first_sees_plain_values() {
        // `orcid:person...` sorts before `person...` in the row
        let change = compute(&thesis(&[
            ("person.identifier.orcid", "0000-0003-0000-0001"),
            ("orcid:person.identifier.orcid", "0000-0003-0000-0001"),
        ]))
        .unwrap();
        assert_eq!(texts(&change.adds), vec!["0000-0003-0000-0001"]);
        assert_eq!(change.adds[0].authority, None);

        let row = line(
            &fixtures::PERSON_ID.to_string(),
            &[
                ("person.identifier.orcid", "0000-0002-1825-0097"),
                ("orcid:person.identifier.orcid", "0000-0002-1825-0097"),
            ],
        );
        assert!(!compute(&row).unwrap().has_changes());
    }

    #[test]
    fn test_collection_move_keeps_mapping() {
        let mut row = thesis(&[]);
        row.collections = Some(vec![DATASETS.into(), ARTICLES.into()]);
        let change = compute(&row).unwrap();

        assert_eq!(change.old_owning_collection.as_ref().unwrap().handle, THESES);
        assert_eq!(change.new_owning_collection.as_ref().unwrap().handle, DATASETS);
        assert!(change.new_mapped_collections.is_empty());
        assert!(change.old_mapped_collections.is_empty());
    }

    #[test]
    fn test_collection_unmap_and_demote() {
        let mut row = thesis(&[]);
        row.collections = Some(vec![THESES.into()]);
        let change = compute(&row).unwrap();
        assert!(!change.owning_changed());
        assert_eq!(change.old_mapped_collections[0].handle, ARTICLES);

        // Swap owner and mapped collection
        row.collections = Some(vec![ARTICLES.into(), THESES.into()]);
        let change = compute(&row).unwrap();
        assert_eq!(change.new_owning_collection.as_ref().unwrap().handle, ARTICLES);
        assert_eq!(change.new_mapped_collections[0].handle, THESES);
        assert!(change.old_mapped_collections.is_empty());
    }

    #[test]
    fn test_owner_not_taken_from_membership_order() {
        let mut repo: MemoryRepository = fixtures::repository();
        // Membership lists the mapped collection first
        repo.remove_from_collection(THESIS_ID, THESES).unwrap();
        repo.add_to_collection(THESIS_ID, THESES).unwrap();
        assert_eq!(repo.collections(THESIS_ID).unwrap(), vec![ARTICLES, THESES]);

        let mut row = thesis(&[]);
        row.collections = Some(vec![THESES.into(), ARTICLES.into()]);
        let config = fixtures::config();
        let change = ChangeComputer::new(&config).compute(&repo, &row).unwrap();
        assert!(!change.has_changes());
    }

    #[test]
    fn test_existing_item_collection_errors() {
        let mut row = thesis(&[]);
        row.collections = Some(vec![]);
        assert!(matches!(compute(&row), Err(RowError::EmptyCollection(_))));
    }

    #[test]
    fn test_actions() {
        let mut row = thesis(&[("dc.title", "ignored")]);
        row.action = LineAction::Expunge;
        let change = compute(&row).unwrap();
        assert!(change.deleted);
        assert!(change.adds.is_empty());

        let config = BulkEditConfig::default();
        let err = ChangeComputer::new(&config)
            .compute(&fixtures::repository(), &row)
            .unwrap_err();
        assert!(matches!(err, RowError::ExpungeDenied(_)));

        let mut row = thesis(&[]);
        row.action = LineAction::Reinstate;
        assert!(!compute(&row).unwrap().has_changes());
        row.action = LineAction::Withdraw;
        assert!(compute(&row).unwrap().withdrawn);

        let mut row = line(&fixtures::WITHDRAWN_ID.to_string(), &[]);
        row.action = LineAction::Withdraw;
        assert!(!compute(&row).unwrap().has_changes());
        row.action = LineAction::Reinstate;
        assert!(compute(&row).unwrap().reinstated);
    }

    #[test]
    fn test_identifier_and_action_mismatch() {
        let mut row = line("+", &[]);
        row.action = LineAction::Update;
        assert!(matches!(compute(&row), Err(RowError::MissingIdentifier)));

        let mut row = thesis(&[]);
        row.action = LineAction::Add;
        assert!(matches!(compute(&row), Err(RowError::AddWithIdentifier)));
    }

    #[test]
    fn test_unknown_item() {
        let row = line(&Uuid::new_v4().to_string(), &[("dc.title", "x")]);
        assert!(matches!(compute(&row), Err(RowError::UnknownItem(_))));
    }

    #[test]
    fn test_typed_references() {
        let row = line("ORCID::0000-0002-1825-0097", &[("dc.title", "Smith, John")]);
        let change = compute(&row).unwrap();
        assert_eq!(change.item.as_ref().unwrap().id, fixtures::PERSON_ID);
        assert!(!change.has_changes());

        // Unknown reference without action: created, reference recorded
        let mut row = line("ORCID::0000-0001-0000-0001", &[("dc.title", "Roe, B.")]);
        row.collections = Some(vec![DATASETS.into()]);
        let change = compute(&row).unwrap();
        assert!(change.new_item);
        assert!(change
            .adds
            .contains(&value("person.identifier.orcid", "0000-0001-0000-0001")));

        row.action = LineAction::Update;
        assert!(matches!(compute(&row), Err(RowError::UnknownItem(_))));

        let row = line("ISNI::0000000121032683", &[]);
        assert!(matches!(compute(&row), Err(RowError::UnknownReferenceType(_))));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  a\r\nb\rc \n"), "a\nb\nc");
    }
}

//! Change application: write a computed [`ChangeSet`] to the repository.
//!
//! Replaced fields are rewritten wholesale from `complete`, which keeps the
//! row's value order. Fields only touched through an authority-type column
//! get their adds appended.

use crate::error::{StoreError, StoreResult};
use crate::models::{ChangeSet, SubmissionMode};
use crate::store::ItemRepository;

/// Apply `change` to `repo`. With `commit` off nothing is written.
///
/// On success `change.item` describes the item after the write (for new
/// items, the item that was created).
pub fn apply_change<R: ItemRepository + ?Sized>(
    repo: &mut R,
    change: &mut ChangeSet,
    commit: bool,
) -> StoreResult<()> {
    if !commit {
        return Ok(());
    }
    if change.new_item {
        return apply_new_item(repo, change);
    }

    let Some(id) = change.item.as_ref().map(|item| item.id) else {
        return Ok(());
    };

    if change.deleted {
        repo.delete_item(id)?;
        log::debug!("Row {}: deleted item {}", change.row, id);
        return Ok(());
    }

    for field in change.touched_fields() {
        if change.replaced_fields.contains(&field) {
            repo.clear_metadata(id, &field)?;
            for value in change.complete_for(&field) {
                repo.add_metadata(id, value.clone())?;
            }
        } else {
            for value in change.adds.iter().filter(|v| v.field == field) {
                repo.add_metadata(id, value.clone())?;
            }
        }
    }

    for old in &change.old_mapped_collections {
        repo.remove_from_collection(id, &old.handle)?;
    }
    if let Some(owner) = &change.new_owning_collection {
        repo.add_to_collection(id, &owner.handle)?;
        repo.set_owning_collection(id, &owner.handle)?;
        if let Some(old) = &change.old_owning_collection {
            let kept_as_mapped = change
                .new_mapped_collections
                .iter()
                .any(|c| c.handle == old.handle);
            if !kept_as_mapped {
                repo.remove_from_collection(id, &old.handle)?;
            }
        }
    }
    for mapped in &change.new_mapped_collections {
        repo.add_to_collection(id, &mapped.handle)?;
    }

    if change.withdrawn {
        repo.withdraw(id)?;
    }
    if change.reinstated {
        repo.reinstate(id)?;
    }
    submit(repo, id, change.submission)?;

    change.item = Some(repo.find_item(id)?.ok_or(StoreError::ItemNotFound(id))?);
    Ok(())
}

fn apply_new_item<R: ItemRepository + ?Sized>(repo: &mut R, change: &mut ChangeSet) -> StoreResult<()> {
    let owner = change
        .new_owning_collection
        .as_ref()
        .ok_or_else(|| StoreError::CollectionNotFound(String::new()))?;

    let created = repo.create_item(&owner.handle)?;
    for value in &change.adds {
        repo.add_metadata(created.id, value.clone())?;
    }
    for mapped in &change.new_mapped_collections {
        repo.add_to_collection(created.id, &mapped.handle)?;
    }
    submit(repo, created.id, change.submission)?;

    log::debug!("Row {}: created item {}", change.row, created.id);
    change.item = Some(repo.find_item(created.id)?.unwrap_or(created));
    Ok(())
}

fn submit<R: ItemRepository + ?Sized>(
    repo: &mut R,
    id: uuid::Uuid,
    mode: Option<SubmissionMode>,
) -> StoreResult<()> {
    match mode {
        Some(SubmissionMode::Archive) => repo.install_item(id),
        Some(SubmissionMode::Workflow) => repo.start_workflow(id),
        Some(SubmissionMode::Workspace) | None => Ok(()),
    }
}

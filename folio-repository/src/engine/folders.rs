//! Folder creation, rename and removal, plus the metadata overlay.

use super::{
    invalid_entry, is_corrupt_payload, not_found, AssetRepository, ChildState, WriteGuard,
};
use crate::{MutationContext, MutationOutcome, RepairKind};
use chrono::Utc;
use folio_core::{
    AssetEntry, DependencyError, EntryMeta, Folder, FolioResult, Principal, RepositoryError,
    ResourceAction,
};
use folio_events::AssetEvent;
use std::collections::BTreeSet;

fn validate_folder_entry(entry: &AssetEntry) -> FolioResult<()> {
    if !entry.is_folder() {
        return Err(invalid_entry(entry, "not a folder type"));
    }
    if entry.is_root() {
        return Err(invalid_entry(entry, "root folders are implicit"));
    }
    if !entry.scope().is_namespace_scope() {
        return Err(invalid_entry(entry, "scope has no folder namespace"));
    }
    if !entry.has_valid_path() {
        return Err(invalid_entry(entry, "invalid path"));
    }
    Ok(())
}

impl AssetRepository {
    // ========================================================================
    // ADD
    // ========================================================================

    /// Create a folder and link it into its parent.
    ///
    /// Emits `Renamed` with no old identifier.
    pub fn add_folder(&self, entry: &AssetEntry, user: &Principal) -> FolioResult<()> {
        validate_folder_entry(entry)?;
        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;
        self.add_folder_locked(entry, user, &guard)?;
        self.end_write(&guard, was_current)
    }

    pub(crate) fn add_folder_locked(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        let parent = entry
            .parent()
            .ok_or_else(|| invalid_entry(entry, "root folders are implicit"))?;
        self.check_asset_permission(user, &parent, ResourceAction::Write)?;

        if self.ensure_folder(&parent, user, guard)?.contains(entry) {
            return Err(RepositoryError::DuplicateEntry {
                folder: parent.identifier(),
                entry: entry.identifier(),
            }
            .into());
        }

        // Content before link. An unlinked payload left by an earlier
        // failure is adopted as is.
        if !self.contains(entry)? {
            self.store_folder(entry, &Folder::new(), guard)?;
        }
        let meta = EntryMeta::created(&user.name, Utc::now());
        self.link_child(&parent, entry.clone(), meta, user, guard)?;

        tracing::debug!(folder = %entry, "Folder added");
        self.fire(AssetEvent::renamed(entry.clone(), None));
        Ok(())
    }

    // ========================================================================
    // RENAME
    // ========================================================================

    /// Rename or move a folder with its whole subtree.
    ///
    /// Descendants keep their path below the folder; scope and owner are
    /// taken from `new`.
    pub fn change_folder(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
        force: bool,
    ) -> FolioResult<MutationOutcome> {
        validate_folder_entry(old)?;
        validate_folder_entry(new)?;
        if old.entry_type() != new.entry_type() {
            return Err(invalid_entry(new, "entry type differs from source"));
        }
        if old == new {
            return Ok(MutationOutcome::Completed);
        }
        if old.is_ancestor_of(new) {
            return Err(invalid_entry(new, "cannot move a folder below itself"));
        }

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;

        self.check_rename_permissions(old, new, user)?;
        if self.load_folder(old)?.is_none() {
            return Err(not_found(old));
        }
        if self.contains(new)? {
            return Err(RepositoryError::DuplicateEntry {
                folder: new.parent().map(|p| p.identifier()).unwrap_or_default(),
                entry: new.identifier(),
            }
            .into());
        }

        if old.scope() != new.scope() {
            let members: BTreeSet<AssetEntry> = self.collect_subtree(old)?.into_iter().collect();
            let mut offenders = Vec::new();
            for sheet in members.iter().filter(|e| e.is_sheet()) {
                offenders.extend(self.enforce_scope_change(
                    sheet,
                    new.scope(),
                    |d| !members.contains(d),
                    force,
                    &guard,
                )?);
            }
            if !offenders.is_empty() {
                return Err(DependencyError::Violation {
                    entry: old.identifier(),
                    dependents: offenders,
                }
                .into());
            }
        }

        let mut ctx = MutationContext::default();
        self.change_folder_locked(old, new, user, true, &mut ctx, &guard)?;
        self.end_write(&guard, was_current)?;
        drop(guard);

        let (outcome, tasks) = ctx.finish();
        tracing::info!(
            old = %old,
            new = %new,
            repairs = outcome.repairs().len(),
            rename_tasks = tasks.len(),
            "Folder renamed"
        );
        self.submit_tasks(tasks);
        Ok(outcome)
    }

    /// Top-down rename. The new folder is written, and linked when `relink`
    /// is set, before any child moves; the old key goes last.
    fn change_folder_locked(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
        relink: bool,
        ctx: &mut MutationContext,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        let folder = match self.load_folder(old) {
            Ok(Some(folder)) => (*folder).clone(),
            Ok(None) => {
                ctx.repair(old.parent().as_ref(), old, RepairKind::MissingPayload);
                Folder::new()
            }
            Err(e) if is_corrupt_payload(&e) => {
                ctx.repair(old.parent().as_ref(), old, RepairKind::MissingPayload);
                Folder::new()
            }
            Err(e) => return Err(e),
        };

        let mut moved = Folder::new();
        let mut children = Vec::with_capacity(folder.len());
        for child in folder.children() {
            match self.child_state(&child.entry)? {
                ChildState::Present => {}
                ChildState::Corrupt if child.entry.is_folder() => {}
                ChildState::Missing => {
                    ctx.repair(Some(old), &child.entry, RepairKind::NotContained);
                    continue;
                }
                ChildState::NotAFolder => {
                    ctx.repair(Some(old), &child.entry, RepairKind::FolderRequired);
                    continue;
                }
                ChildState::Corrupt => {
                    ctx.repair(Some(old), &child.entry, RepairKind::MissingPayload);
                    self.remove_payload(&child.entry, guard)?;
                    continue;
                }
            }
            let target = child.entry.relocated(old, new);
            moved.add_entry_with_meta(target.clone(), child.meta.clone());
            children.push((child.entry.clone(), target));
        }

        self.store_folder(new, &moved, guard)?;
        if relink {
            self.relink(old, new, user, guard)?;
        }

        for (child_old, child_new) in &children {
            if child_old.is_folder() {
                self.change_folder_locked(child_old, child_new, user, false, ctx, guard)?;
            } else {
                self.change_sheet_locked(child_old, child_new, user, false, ctx, guard)?;
            }
        }

        self.remove_payload(old, guard)?;
        self.fire(AssetEvent::renamed(new.clone(), Some(old)));
        Ok(())
    }

    // ========================================================================
    // REMOVE
    // ========================================================================

    /// Remove a folder and everything below it, children first.
    ///
    /// Fails with `DependencyViolation` when an entry outside the subtree
    /// depends on one inside it, unless `force` is set.
    pub fn remove_folder(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        force: bool,
    ) -> FolioResult<MutationOutcome> {
        validate_folder_entry(entry)?;

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;
        self.check_asset_permission(user, entry, ResourceAction::Delete)?;

        let parent = entry.parent();
        let linked = match &parent {
            Some(parent) => self
                .load_folder(parent)?
                .is_some_and(|folder| folder.contains(entry)),
            None => false,
        };
        if !linked && !self.contains(entry)? {
            return Err(not_found(entry));
        }

        let mut members: BTreeSet<AssetEntry> = self.collect_subtree(entry)?.into_iter().collect();
        members.insert(entry.clone());
        let mut blocking = BTreeSet::new();
        for sheet in members.iter().filter(|e| e.is_sheet()) {
            blocking.extend(
                self.dependents_of(sheet)?
                    .into_iter()
                    .filter(|d| !members.contains(d)),
            );
        }
        if !blocking.is_empty() {
            if !force {
                return Err(DependencyError::Violation {
                    entry: entry.identifier(),
                    dependents: blocking.into_iter().collect(),
                }
                .into());
            }
            tracing::warn!(
                folder = %entry,
                dependents = blocking.len(),
                "Forced removal, dependents keep dangling references"
            );
        }

        let mut ctx = MutationContext::default();
        self.remove_folder_locked(entry, true, &mut ctx, &guard)?;
        self.end_write(&guard, was_current)?;

        let (outcome, _) = ctx.finish();
        tracing::info!(
            folder = %entry,
            removed = members.len(),
            repairs = outcome.repairs().len(),
            "Folder removed"
        );
        Ok(outcome)
    }

    fn remove_folder_locked(
        &self,
        entry: &AssetEntry,
        unlink: bool,
        ctx: &mut MutationContext,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        self.fire(AssetEvent::to_be_deleted(entry.clone()));

        let folder = match self.load_folder(entry) {
            Ok(folder) => folder,
            Err(e) if is_corrupt_payload(&e) => None,
            Err(e) => return Err(e),
        };
        match &folder {
            None => ctx.repair(entry.parent().as_ref(), entry, RepairKind::MissingPayload),
            Some(folder) => {
                for child in folder.entries() {
                    self.remove_child(entry, child, ctx, guard)?;
                }
            }
        }

        self.remove_payload(entry, guard)?;
        if unlink {
            if let Some(parent) = entry.parent() {
                self.unlink_child(&parent, entry, guard)?;
            }
        }
        self.fire(AssetEvent::deleted(entry.clone()));
        Ok(())
    }

    fn remove_child(
        &self,
        folder: &AssetEntry,
        child: &AssetEntry,
        ctx: &mut MutationContext,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        match self.child_state(child)? {
            ChildState::Missing => {
                ctx.repair(Some(folder), child, RepairKind::NotContained);
            }
            ChildState::NotAFolder => {
                ctx.repair(Some(folder), child, RepairKind::FolderRequired);
                self.remove_payload(child, guard)?;
            }
            ChildState::Present | ChildState::Corrupt if child.is_folder() => {
                self.remove_folder_locked(child, false, ctx, guard)?;
            }
            ChildState::Present if child.is_sheet() => {
                let sheet = self.load_sheet(child)?;
                self.remove_sheet_locked(child, sheet, false, guard)?;
            }
            ChildState::Corrupt if child.is_sheet() => {
                ctx.repair(Some(folder), child, RepairKind::MissingPayload);
                self.remove_sheet_locked(child, None, false, guard)?;
            }
            ChildState::Present | ChildState::Corrupt => {
                self.remove_payload(child, guard)?;
                self.fire(AssetEvent::deleted(child.clone()));
            }
        }
        Ok(())
    }

    /// Every entry below `folder`, depth first. Unreadable folders
    /// contribute nothing.
    pub(crate) fn collect_subtree(&self, folder: &AssetEntry) -> FolioResult<Vec<AssetEntry>> {
        let mut out = Vec::new();
        let mut pending = vec![folder.clone()];
        while let Some(current) = pending.pop() {
            let loaded = match self.load_folder(&current) {
                Ok(loaded) => loaded,
                Err(e) if is_corrupt_payload(&e) => None,
                Err(e) => return Err(e),
            };
            let Some(loaded) = loaded else {
                continue;
            };
            for child in loaded.entries() {
                if child.is_folder() {
                    pending.push(child.clone());
                }
                out.push(child.clone());
            }
        }
        Ok(out)
    }

    // ========================================================================
    // METADATA OVERLAY
    // ========================================================================

    /// Set or clear the alias `entry` carries in its folder.
    pub fn set_alias(
        &self,
        entry: &AssetEntry,
        alias: Option<String>,
        user: &Principal,
    ) -> FolioResult<()> {
        self.check_asset_permission(user, entry, ResourceAction::Write)?;
        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;

        let (parent, mut folder) = self.containing_folder(entry)?;
        folder.set_alias(entry, alias);
        if let Some(meta) = folder.meta_mut(entry) {
            meta.touch(&user.name, Utc::now());
        }
        self.store_folder(&parent, &folder, &guard)?;
        self.end_write(&guard, was_current)?;

        self.fire(AssetEvent::modified(entry.clone()));
        Ok(())
    }

    /// Mark or unmark `entry` as one of `user`'s favorites. Returns whether
    /// anything changed.
    pub fn set_favorite(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        favorite: bool,
    ) -> FolioResult<bool> {
        self.check_asset_permission(user, entry, ResourceAction::Read)?;
        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;

        let (parent, mut folder) = self.containing_folder(entry)?;
        let already = folder
            .meta(entry)
            .is_some_and(|meta| meta.is_favorite_of(&user.name));
        if already == favorite {
            return Ok(false);
        }
        folder.set_favorite(entry, &user.name, favorite);
        self.store_folder(&parent, &folder, &guard)?;
        self.end_write(&guard, was_current)?;
        Ok(true)
    }

    fn containing_folder(&self, entry: &AssetEntry) -> FolioResult<(AssetEntry, Folder)> {
        let parent = entry
            .parent()
            .filter(|_| entry.scope().is_namespace_scope())
            .ok_or_else(|| invalid_entry(entry, "entry has no containing folder"))?;
        let folder = self
            .load_folder(&parent)?
            .filter(|folder| folder.contains(entry))
            .ok_or_else(|| RepositoryError::NotContainedEntry {
                folder: parent.identifier(),
                entry: entry.identifier(),
            })?;
        Ok((parent, (*folder).clone()))
    }
}

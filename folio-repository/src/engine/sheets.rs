//! Sheet reads and writes, renames and removal.

use super::{invalid_entry, is_corrupt_payload, not_found, AssetRepository, WriteGuard};
use crate::{MutationContext, MutationOutcome, RepairKind};
use chrono::Utc;
use folio_core::{
    AssetEntry, DependencyError, EntryMeta, FolioResult, Payload, Principal, RepositoryError,
    ResourceAction, Scope, Sheet, PROP_PREVIEW_SOURCE,
};
use folio_events::AssetEvent;
use std::sync::Arc;

/// Which view of a sheet to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetLoad {
    #[default]
    Full,
    /// Everything but the content body, served from the context tier.
    Context,
}

/// Flags of [`AssetRepository::set_sheet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSheetOptions {
    /// Drop invalid dependencies instead of failing.
    pub force: bool,
    pub check_dependency: bool,
    pub update_dependency: bool,
    pub check_cross_joins: bool,
}

impl Default for SetSheetOptions {
    fn default() -> Self {
        Self {
            force: false,
            check_dependency: true,
            update_dependency: true,
            check_cross_joins: true,
        }
    }
}

impl SetSheetOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_check_dependency(mut self, check: bool) -> Self {
        self.check_dependency = check;
        self
    }

    pub fn with_update_dependency(mut self, update: bool) -> Self {
        self.update_dependency = update;
        self
    }

    pub fn with_check_cross_joins(mut self, check: bool) -> Self {
        self.check_cross_joins = check;
        self
    }
}

fn validate_sheet_entry(entry: &AssetEntry) -> FolioResult<()> {
    if entry.scope() == Scope::Query {
        return Err(RepositoryError::InvalidStorage {
            scope: entry.scope(),
            entry: entry.identifier(),
        }
        .into());
    }
    if !entry.is_sheet() {
        return Err(invalid_entry(entry, "not a sheet type"));
    }
    if entry.is_root() || !entry.has_valid_path() {
        return Err(invalid_entry(entry, "invalid path"));
    }
    Ok(())
}

/// Folder-linked scopes keep a parent link; component entries are found by
/// key enumeration.
fn is_linked(entry: &AssetEntry) -> bool {
    entry.scope().is_namespace_scope()
}

fn event_payload(sheet: &Sheet) -> Arc<Payload> {
    Arc::new(Payload::sheet(sheet.clone()))
}

impl AssetRepository {
    // ========================================================================
    // READ
    // ========================================================================

    /// Read a sheet. `None` when nothing is stored at `entry`.
    pub fn get_sheet(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        action: ResourceAction,
        load: SheetLoad,
    ) -> FolioResult<Option<Arc<Sheet>>> {
        validate_sheet_entry(entry)?;
        self.check_asset_permission(user, entry, action)?;
        self.refresh()?;
        match load {
            SheetLoad::Full => self.load_sheet(entry),
            SheetLoad::Context => self.load_context(entry),
        }
    }

    // ========================================================================
    // WRITE
    // ========================================================================

    /// Store `sheet` at `entry`, link it into its folder and register its
    /// dependencies. Returns the sheet as stored.
    ///
    /// The dependents recorded on a previous version carry over; the
    /// dependencies are those of `sheet`. Cycle detection looks one hop
    /// deep only: A→B→A is rejected, A→B→C→A is not.
    pub fn set_sheet(
        &self,
        entry: &AssetEntry,
        sheet: Sheet,
        user: &Principal,
        options: SetSheetOptions,
    ) -> FolioResult<Arc<Sheet>> {
        validate_sheet_entry(entry)?;
        if options.check_cross_joins
            && sheet.has_cross_joins()
            && !self.config.repository.allow_cross_joins
        {
            return Err(RepositoryError::CrossJoinDenied {
                entry: entry.identifier(),
            }
            .into());
        }

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;
        let stored = self.set_sheet_locked(entry, sheet, user, options, &guard)?;
        self.end_write(&guard, was_current)?;
        Ok(stored)
    }

    fn set_sheet_locked(
        &self,
        entry: &AssetEntry,
        mut sheet: Sheet,
        user: &Principal,
        options: SetSheetOptions,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<Arc<Sheet>> {
        let old = self.load_sheet(entry)?;
        let parent = entry.parent().filter(|_| is_linked(entry));

        // New entries need WRITE on the folder, replacements on the entry.
        let is_new = match &parent {
            Some(parent) => !self
                .load_folder(parent)?
                .is_some_and(|folder| folder.contains(entry)),
            None => old.is_none(),
        };
        match (&parent, is_new) {
            (Some(parent), true) => {
                self.check_asset_permission(user, parent, ResourceAction::Write)?
            }
            _ => self.check_asset_permission(user, entry, ResourceAction::Write)?,
        }
        if let Some(old) = &old {
            sheet.set_dependents(old.dependents().cloned());
        }

        // Nothing is written until the dependencies check out.
        self.validate_dependencies(entry, &mut sheet, options)?;
        if let Some(parent) = &parent {
            self.ensure_folder(parent, user, guard)?;
        }
        self.link_back_edges(entry, &sheet, old.as_deref(), guard)?;

        let now = Utc::now();
        sheet.created_by = old
            .as_ref()
            .and_then(|o| o.created_by.clone())
            .or_else(|| Some(user.name.clone()));
        sheet.created_at = old.as_ref().and_then(|o| o.created_at).or(Some(now));
        sheet.modified_by = Some(user.name.clone());
        sheet.modified_at = Some(now);

        if let Some(preview) = entry
            .property(PROP_PREVIEW_SOURCE)
            .and_then(|id| AssetEntry::parse_identifier(id).ok())
        {
            self.adopt_preview_bookmarks(&preview, entry, user, guard)?;
        }

        self.store_sheet(entry, &sheet, guard)?;

        if let Some(parent) = &parent {
            let meta = match self.entry_meta(entry)? {
                Some(mut meta) => {
                    meta.touch(&user.name, now);
                    meta
                }
                None => EntryMeta::created(&user.name, now),
            };
            self.link_child(parent, entry.clone(), meta, user, guard)?;
        }

        if options.update_dependency {
            let report = self
                .index
                .update_sheet_dependencies(Some(&sheet), old.as_deref(), entry)?;
            if !report.is_clean() {
                tracing::warn!(
                    entry = %entry,
                    failed = report.failed.len(),
                    timed_out = report.timed_out,
                    "Reverse index only partially updated"
                );
            }
        }

        tracing::debug!(entry = %entry, created = old.is_none(), "Sheet stored");
        self.fire(AssetEvent::modified(entry.clone()).with_payload(event_payload(&sheet)));
        Ok(Arc::new(sheet))
    }

    /// Scope validity and one-hop cycle check of every outer dependency.
    fn validate_dependencies(
        &self,
        entry: &AssetEntry,
        sheet: &mut Sheet,
        options: SetSheetOptions,
    ) -> FolioResult<()> {
        if !options.check_dependency {
            return Ok(());
        }
        let dependencies: Vec<AssetEntry> = sheet.dependencies().cloned().collect();
        for dependency in dependencies {
            if let Err(e) = self.check_dependency_validity(entry, &dependency) {
                if !options.force {
                    return Err(e);
                }
                tracing::warn!(
                    entry = %entry,
                    dependency = %dependency,
                    error = %e,
                    "Dropping invalid dependency"
                );
                sheet.remove_dependency(&dependency);
                continue;
            }

            let cyclic = &dependency == entry
                || (dependency.is_sheet()
                    && self
                        .load_sheet(&dependency)?
                        .is_some_and(|d| d.contains_dependency(entry)));
            if cyclic {
                return Err(DependencyError::Cycle {
                    entry: entry.identifier(),
                    dependency: dependency.identifier(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Record `entry` as a dependent on every sheet it depends on, and drop
    /// it from sheets the previous version depended on but this one does not.
    fn link_back_edges(
        &self,
        entry: &AssetEntry,
        sheet: &Sheet,
        old: Option<&Sheet>,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        for dependency in sheet.dependencies().filter(|d| d.is_sheet()) {
            let Some(target) = self.load_sheet(dependency)? else {
                continue;
            };
            if target.contains_dependent(entry) {
                continue;
            }
            let mut target = (*target).clone();
            target.add_dependent(entry.clone());
            self.store_sheet(dependency, &target, guard)?;
        }

        let Some(old) = old else {
            return Ok(());
        };
        for stale in old
            .dependencies()
            .filter(|d| d.is_sheet() && !sheet.contains_dependency(d))
        {
            if let Some(target) = self.load_sheet(stale)? {
                let mut target = (*target).clone();
                if target.remove_dependent(entry) {
                    self.store_sheet(stale, &target, guard)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // RENAME
    // ========================================================================

    /// Rename or move a sheet.
    ///
    /// Crossing scopes is subject to the scope-change rule; `force` cuts the
    /// offending edges instead of failing. Rewrite work for dependents is
    /// submitted once the lock is released.
    pub fn change_sheet(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
        force: bool,
    ) -> FolioResult<MutationOutcome> {
        validate_sheet_entry(old)?;
        validate_sheet_entry(new)?;
        if old.entry_type() != new.entry_type() {
            return Err(invalid_entry(new, "entry type differs from source"));
        }
        if is_linked(old) != is_linked(new) {
            return Err(invalid_entry(new, "cannot move between folder and component scopes"));
        }
        if old == new {
            return Ok(MutationOutcome::Completed);
        }

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;

        self.check_rename_permissions(old, new, user)?;
        if self.load_sheet(old)?.is_none() {
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
            let offenders = self.enforce_scope_change(old, new.scope(), |_| true, force, &guard)?;
            if !offenders.is_empty() {
                return Err(DependencyError::Violation {
                    entry: old.identifier(),
                    dependents: offenders,
                }
                .into());
            }
        }

        let mut ctx = MutationContext::default();
        self.change_sheet_locked(old, new, user, true, &mut ctx, &guard)?;
        self.end_write(&guard, was_current)?;
        drop(guard);

        let (outcome, tasks) = ctx.finish();
        self.submit_tasks(tasks);
        Ok(outcome)
    }

    /// Move one sheet. `relink` is false when a folder rename has already
    /// written the new parent.
    pub(crate) fn change_sheet_locked(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
        relink: bool,
        ctx: &mut MutationContext,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        let Some(sheet) = self.load_sheet(old)? else {
            ctx.repair(old.parent().as_ref(), old, RepairKind::NotContained);
            return Ok(());
        };

        ctx.tasks.merge(self.index.get_rename_dependency_info(old, new)?);

        // Point neighbouring sheets at the new entry.
        for dependency in sheet.dependencies().filter(|d| d.is_sheet()) {
            if let Some(target) = self.load_sheet(dependency)? {
                let mut target = (*target).clone();
                if target.replace_dependent(old, new.clone()) {
                    self.store_sheet(dependency, &target, guard)?;
                }
            }
        }
        for dependent in self.dependents_of(old)? {
            if !dependent.is_sheet() {
                continue;
            }
            if let Some(source) = self.load_sheet(&dependent)? {
                let mut source = (*source).clone();
                let mut changed = source.replace_dependency(old, new.clone());
                for reference in source.references.iter_mut().filter(|r| &r.target == old) {
                    reference.target = new.clone();
                    changed = true;
                }
                if changed {
                    self.store_sheet(&dependent, &source, guard)?;
                }
            }
        }

        let moved = sheet;

        // New before old.
        self.store_sheet(new, &moved, guard)?;
        if relink && is_linked(old) {
            self.relink(old, new, user, guard)?;
        }
        self.remove_payload(old, guard)?;

        if old.entry_type().is_worksheet() || old.entry_type().is_viewsheet() {
            self.index.update_dependencies(old, new, &moved)?;
        } else {
            self.index.rename_dependencies(old, new)?;
        }

        if old.entry_type().is_viewsheet() {
            if old.owner() == new.owner() {
                self.rename_bookmarks(old, new, guard)?;
            } else {
                tracing::debug!(old = %old, new = %new, "Owner changed, bookmarks left behind");
            }
        }

        ctx.record_move(old, new);
        tracing::debug!(old = %old, new = %new, "Sheet renamed");
        self.fire(AssetEvent::renamed(new.clone(), Some(old)).with_payload(event_payload(&moved)));
        Ok(())
    }

    // ========================================================================
    // REMOVE
    // ========================================================================

    /// Remove a sheet.
    ///
    /// Fails with `DependencyViolation` while other entries still depend on
    /// it, unless `force` is set. A sheet listed by its folder but missing
    /// from the store is unlinked and reported as a repair.
    pub fn remove_sheet(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        force: bool,
    ) -> FolioResult<MutationOutcome> {
        validate_sheet_entry(entry)?;

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;
        self.check_asset_permission(user, entry, ResourceAction::Delete)?;

        let parent = entry.parent().filter(|_| is_linked(entry));
        let mut ctx = MutationContext::default();

        let sheet = match self.load_sheet(entry) {
            Ok(Some(sheet)) => Some(sheet),
            Ok(None) => {
                let linked = match &parent {
                    Some(parent) => self.unlink_child(parent, entry, &guard)?.is_some(),
                    None => false,
                };
                if !linked {
                    return Err(not_found(entry));
                }
                ctx.repair(parent.as_ref(), entry, RepairKind::NotContained);
                self.end_write(&guard, was_current)?;
                return Ok(ctx.finish().0);
            }
            Err(e) if is_corrupt_payload(&e) => {
                ctx.repair(parent.as_ref(), entry, RepairKind::MissingPayload);
                None
            }
            Err(e) => return Err(e),
        };

        let blocking: Vec<AssetEntry> = self
            .dependents_of(entry)?
            .into_iter()
            .filter(|d| d != entry)
            .collect();
        if !blocking.is_empty() {
            if !force {
                return Err(DependencyError::Violation {
                    entry: entry.identifier(),
                    dependents: blocking,
                }
                .into());
            }
            tracing::warn!(
                entry = %entry,
                dependents = blocking.len(),
                "Forced removal, dependents keep dangling references"
            );
        }

        self.remove_sheet_locked(entry, sheet, true, &guard)?;
        self.end_write(&guard, was_current)?;
        Ok(ctx.finish().0)
    }

    /// Delete one sheet with everything hanging off it: back-edges, reverse
    /// index records, embedded snapshot and bookmarks.
    pub(crate) fn remove_sheet_locked(
        &self,
        entry: &AssetEntry,
        sheet: Option<Arc<Sheet>>,
        unlink: bool,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        self.fire(AssetEvent::to_be_deleted(entry.clone()));

        if let Some(sheet) = &sheet {
            for dependency in sheet.dependencies().filter(|d| d.is_sheet()) {
                if let Ok(Some(target)) = self.load_sheet(dependency) {
                    let mut target = (*target).clone();
                    if target.remove_dependent(entry) {
                        self.store_sheet(dependency, &target, guard)?;
                    }
                }
            }
            self.index.update_sheet_dependencies(None, Some(sheet), entry)?;
            if let Some(snapshot) = &sheet.embedded_snapshot {
                self.remove_payload(snapshot, guard)?;
            }
        }

        for dependent in self.dependents_of(entry)? {
            if !dependent.is_sheet() {
                continue;
            }
            if let Ok(Some(source)) = self.load_sheet(&dependent) {
                let mut source = (*source).clone();
                if source.remove_dependency(entry) {
                    self.store_sheet(&dependent, &source, guard)?;
                }
            }
        }
        self.index.delete_dependencies(entry)?;

        if entry.entry_type().is_viewsheet() {
            self.remove_bookmarks(entry, guard)?;
        }
        self.remove_payload(entry, guard)?;

        if unlink {
            if let Some(parent) = entry.parent().filter(|_| is_linked(entry)) {
                self.unlink_child(&parent, entry, guard)?;
            }
        }

        tracing::debug!(entry = %entry, "Sheet removed");
        let mut event = AssetEvent::deleted(entry.clone());
        if let Some(sheet) = &sheet {
            event = event.with_payload(event_payload(sheet));
        }
        self.fire(event);
        Ok(())
    }
}

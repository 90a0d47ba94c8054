//! Asset Repository Engine.
//!
//! A hierarchical namespace over a [`KeyValueStore`]. Folders and sheets are
//! persisted at their entry identifiers; a folder payload lists its children.
//! Every structural mutation runs under one write lock for its whole
//! duration; reads take no lock and rely on the store watermark to drop
//! stale cache contents wholesale.
//!
//! Multi-key writes are ordered so that a failure part way through leaves a
//! state the same call can repair: content is written before it is linked,
//! new keys before old keys are removed.

mod bookmarks;
mod folders;
mod listing;
mod scope;
mod sheets;

pub use scope::ScopeChange;
pub use sheets::{SetSheetOptions, SheetLoad};

use crate::authz;
use crate::{
    Authorization, DependencyIndex, NoopTransformWorker, QueryCatalog,
    RenameDependencyInfo, RenameTransformWorker, DEPENDENCY_KEY_PREFIX,
};
use chrono::Utc;
use folio_core::{
    AssetEntry, EntryMeta, Folder, FolioConfig, FolioError, FolioResult, Payload, Principal,
    RepositoryError, ResourceAction, Sheet, StorageError,
};
use folio_events::{AssetEvent, AssetListener, EventBus, ListenerHandle};
use folio_storage::{
    ChangeKind, KeyValueStore, OrgScopedKey, RepositoryCache, RepositoryCacheStats, StoreChange,
    SubscriptionId,
};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`AssetRepository`].
pub struct AssetRepositoryBuilder {
    store: Arc<dyn KeyValueStore>,
    authz: Arc<dyn Authorization>,
    config: FolioConfig,
    worker: Arc<dyn RenameTransformWorker>,
    catalog: Option<Arc<dyn QueryCatalog>>,
}

impl AssetRepositoryBuilder {
    pub fn config(mut self, config: FolioConfig) -> Self {
        self.config = config;
        self
    }

    /// Receiver of rename-transform work. Defaults to dropping it.
    pub fn transform_worker(mut self, worker: Arc<dyn RenameTransformWorker>) -> Self {
        self.worker = worker;
        self
    }

    /// Source of `Query` scope listings. Without one, such listings fail
    /// with `InvalidStorage`.
    pub fn query_catalog(mut self, catalog: Arc<dyn QueryCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> FolioResult<AssetRepository> {
        self.config.validate()?;

        let cache = Arc::new(RepositoryCache::new(&self.config.cache));
        let events = EventBus::new();
        let subscription = self
            .store
            .subscribe(external_change_listener(Arc::clone(&cache), events.clone()));
        let index = DependencyIndex::new(Arc::clone(&self.store), self.config.dependency.clone());

        tracing::info!(
            subscription = %subscription,
            flush_parallelism = self.config.dependency.effective_parallelism(),
            "Asset repository initialized"
        );

        Ok(AssetRepository {
            store: self.store,
            authz: self.authz,
            cache,
            events,
            index,
            worker: self.worker,
            catalog: self.catalog,
            config: self.config,
            write_lock: Mutex::new(()),
            subscription,
        })
    }
}

/// Invalidate keys other writers changed and re-publish them as events.
///
/// Holds the cache and the bus, never the repository itself.
fn external_change_listener(
    cache: Arc<RepositoryCache>,
    events: EventBus,
) -> folio_storage::StoreListener {
    Arc::new(move |changes: &[StoreChange]| {
        for change in changes {
            let key = OrgScopedKey::new(change.org_id.as_str(), change.key.as_str());
            if let Err(e) = cache.invalidate(&key) {
                tracing::warn!(key = %key, error = %e, "Failed to invalidate cache entry");
            }
            if change.key.starts_with(DEPENDENCY_KEY_PREFIX) {
                continue;
            }
            let Ok(entry) = AssetEntry::parse_identifier(&change.key) else {
                continue;
            };
            let event = match change.kind {
                ChangeKind::Added => AssetEvent::added(entry),
                ChangeKind::Removed => AssetEvent::deleted(entry),
                ChangeKind::Modified => AssetEvent::modified(entry),
            };
            events.fire(&event);
        }
    })
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// Proof that the repository write lock is held.
///
/// Nested mutations take `&WriteGuard` instead of locking again.
pub(crate) struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// The asset repository.
pub struct AssetRepository {
    store: Arc<dyn KeyValueStore>,
    authz: Arc<dyn Authorization>,
    cache: Arc<RepositoryCache>,
    events: EventBus,
    index: DependencyIndex,
    worker: Arc<dyn RenameTransformWorker>,
    catalog: Option<Arc<dyn QueryCatalog>>,
    config: FolioConfig,
    write_lock: Mutex<()>,
    subscription: SubscriptionId,
}

impl AssetRepository {
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        authz: Arc<dyn Authorization>,
    ) -> AssetRepositoryBuilder {
        AssetRepositoryBuilder {
            store,
            authz,
            config: FolioConfig::default(),
            worker: Arc::new(NoopTransformWorker),
            catalog: None,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn add_listener(&self, listener: Arc<dyn AssetListener>) -> ListenerHandle {
        self.events.register(listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.events.unregister(handle)
    }

    pub fn dependency_index(&self) -> &DependencyIndex {
        &self.index
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> RepositoryCacheStats {
        self.cache.stats()
    }

    /// Check `action` on `entry`. See [`authz::check_asset_permission`].
    pub fn check_asset_permission(
        &self,
        principal: &Principal,
        entry: &AssetEntry,
        action: ResourceAction,
    ) -> FolioResult<()> {
        authz::check_asset_permission(self.authz.as_ref(), principal, entry, action)
    }

    // ========================================================================
    // LOCKING AND WATERMARK
    // ========================================================================

    pub(crate) fn lock(&self) -> FolioResult<WriteGuard<'_>> {
        let guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(WriteGuard { _guard: guard })
    }

    /// Start a mutation. Returns whether the cache was current beforehand.
    pub(crate) fn begin_write(&self, _guard: &WriteGuard<'_>) -> FolioResult<bool> {
        let current = self.store.last_modified();
        let was_current = self.cache.is_current(current)?;
        if !was_current {
            self.cache.sync(current)?;
        }
        Ok(was_current)
    }

    /// Adopt the store watermark, but only if the cache was current when the
    /// mutation started. Every key the mutation wrote is already invalidated.
    pub(crate) fn end_write(&self, _guard: &WriteGuard<'_>, was_current: bool) -> FolioResult<()> {
        if was_current {
            self.cache.mark_current(self.store.last_modified())?;
        }
        Ok(())
    }

    /// Read path: drop everything if another writer advanced the store.
    pub(crate) fn refresh(&self) -> FolioResult<()> {
        self.cache.sync(self.store.last_modified())?;
        Ok(())
    }

    /// Hand collected rename work to the worker. Called with no lock held.
    pub(crate) fn submit_tasks(&self, tasks: RenameDependencyInfo) {
        if tasks.is_empty() {
            return;
        }
        tracing::debug!(tasks = tasks.len(), "Submitting rename tasks");
        self.worker.submit(tasks);
    }

    // ========================================================================
    // PAYLOAD ACCESS
    // ========================================================================

    /// Folder payload of `entry`, through the folder tier.
    pub(crate) fn load_folder(&self, entry: &AssetEntry) -> FolioResult<Option<Arc<Folder>>> {
        let key = OrgScopedKey::for_entry(entry);
        if let Some(folder) = self.cache.folders().get(&key)? {
            return Ok(Some(folder));
        }
        match self.store.get(&entry.identifier(), entry.org_id())? {
            None => Ok(None),
            Some(Payload::Folder(folder)) => {
                let folder = Arc::new(folder);
                self.cache.folders().insert(key, Arc::clone(&folder))?;
                Ok(Some(folder))
            }
            Some(_) => Err(RepositoryError::FolderRequired {
                entry: entry.identifier(),
            }
            .into()),
        }
    }

    /// Full sheet payload of `entry`, through the sheet tier. Also fills the
    /// context tier.
    pub(crate) fn load_sheet(&self, entry: &AssetEntry) -> FolioResult<Option<Arc<Sheet>>> {
        let key = OrgScopedKey::for_entry(entry);
        if let Some(sheet) = self.cache.sheets().get(&key)? {
            return Ok(Some(sheet));
        }
        let identifier = entry.identifier();
        match self.store.get(&identifier, entry.org_id())? {
            None => Ok(None),
            Some(Payload::Sheet(sheet)) => {
                let sheet = Arc::new(*sheet);
                self.cache
                    .contexts()
                    .insert(key.clone(), Arc::new(sheet.context_view()))?;
                self.cache.sheets().insert(key, Arc::clone(&sheet))?;
                Ok(Some(sheet))
            }
            Some(other) => Err(StorageError::UnexpectedPayload {
                key: identifier,
                expected: "sheet",
                found: other.kind(),
            }
            .into()),
        }
    }

    /// Context (no-data) view of `entry`, through the context tier.
    pub(crate) fn load_context(&self, entry: &AssetEntry) -> FolioResult<Option<Arc<Sheet>>> {
        let key = OrgScopedKey::for_entry(entry);
        if let Some(sheet) = self.cache.contexts().get(&key)? {
            return Ok(Some(sheet));
        }
        Ok(self
            .load_sheet(entry)?
            .map(|sheet| Arc::new(sheet.context_view())))
    }

    pub(crate) fn contains(&self, entry: &AssetEntry) -> FolioResult<bool> {
        self.store.contains(&entry.identifier(), entry.org_id())
    }

    pub(crate) fn store_folder(
        &self,
        entry: &AssetEntry,
        folder: &Folder,
        _guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        self.store
            .put(&entry.identifier(), entry.org_id(), &Payload::Folder(folder.clone()))?;
        self.cache.invalidate(&OrgScopedKey::for_entry(entry))
    }

    pub(crate) fn store_sheet(
        &self,
        entry: &AssetEntry,
        sheet: &Sheet,
        _guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        self.store
            .put(&entry.identifier(), entry.org_id(), &Payload::sheet(sheet.clone()))?;
        self.cache.invalidate(&OrgScopedKey::for_entry(entry))
    }

    pub(crate) fn remove_payload(
        &self,
        entry: &AssetEntry,
        _guard: &WriteGuard<'_>,
    ) -> FolioResult<bool> {
        let removed = self.store.remove(&entry.identifier(), entry.org_id())?;
        self.cache.invalidate(&OrgScopedKey::for_entry(entry))?;
        Ok(removed)
    }

    // ========================================================================
    // FOLDER LINKS
    // ========================================================================

    /// Load `entry`'s folder, creating it when absent: the root always,
    /// other folders only when missing parents may be created.
    pub(crate) fn ensure_folder(
        &self,
        entry: &AssetEntry,
        user: &Principal,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<Folder> {
        if let Some(folder) = self.load_folder(entry)? {
            return Ok((*folder).clone());
        }
        if entry.is_root() {
            let folder = Folder::new();
            self.store_folder(entry, &folder, guard)?;
            tracing::debug!(root = %entry, "Created root folder");
            return Ok(folder);
        }
        if !self.config.repository.create_missing_parents {
            return Err(not_found(entry));
        }
        self.add_folder_locked(entry, user, guard)?;
        Ok(Folder::new())
    }

    /// Put `child` into `parent`, replacing an existing link to it.
    pub(crate) fn link_child(
        &self,
        parent: &AssetEntry,
        child: AssetEntry,
        meta: EntryMeta,
        user: &Principal,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        let mut folder = self.ensure_folder(parent, user, guard)?;
        folder.remove_entry(&child);
        folder.add_entry_with_meta(child, meta);
        self.store_folder(parent, &folder, guard)
    }

    /// Drop the link to `child` from `parent`. Returns its metadata.
    pub(crate) fn unlink_child(
        &self,
        parent: &AssetEntry,
        child: &AssetEntry,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<Option<EntryMeta>> {
        let Some(folder) = self.load_folder(parent)? else {
            return Ok(None);
        };
        let mut folder = (*folder).clone();
        let meta = folder.remove_entry(child);
        if meta.is_some() {
            self.store_folder(parent, &folder, guard)?;
        }
        Ok(meta)
    }

    /// Metadata of `entry` in its parent, if linked.
    pub(crate) fn entry_meta(&self, entry: &AssetEntry) -> FolioResult<Option<EntryMeta>> {
        let Some(parent) = entry.parent() else {
            return Ok(None);
        };
        Ok(self
            .load_folder(&parent)?
            .and_then(|folder| folder.meta(entry).cloned()))
    }

    /// Move the link of `old` to `new`. Within one folder the link keeps
    /// its position; across folders the new link is written first.
    pub(crate) fn relink(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        let (Some(old_parent), Some(new_parent)) = (old.parent(), new.parent()) else {
            return Ok(());
        };
        if old_parent == new_parent {
            let mut folder = self.ensure_folder(&old_parent, user, guard)?;
            if !folder.replace_entry(old, new.clone()) {
                folder.add_entry_with_meta(new.clone(), EntryMeta::created(&user.name, Utc::now()));
            }
            return self.store_folder(&old_parent, &folder, guard);
        }

        let mut meta = self
            .entry_meta(old)?
            .unwrap_or_else(|| EntryMeta::created(&user.name, Utc::now()));
        meta.touch(&user.name, Utc::now());
        self.link_child(&new_parent, new.clone(), meta, user, guard)?;
        self.unlink_child(&old_parent, old, guard)?;
        Ok(())
    }

    /// Whether a folder's child resolves to a usable payload.
    pub(crate) fn child_state(&self, child: &AssetEntry) -> FolioResult<ChildState> {
        let loaded = if child.is_folder() {
            self.load_folder(child).map(|f| f.is_some())
        } else if child.is_sheet() {
            self.load_sheet(child).map(|s| s.is_some())
        } else {
            self.contains(child)
        };
        match loaded {
            Ok(true) => Ok(ChildState::Present),
            Ok(false) => Ok(ChildState::Missing),
            Err(FolioError::Repository(RepositoryError::FolderRequired { .. })) => {
                Ok(ChildState::NotAFolder)
            }
            Err(e) if is_corrupt_payload(&e) => Ok(ChildState::Corrupt),
            Err(e) => Err(e),
        }
    }

    /// WRITE and DELETE on the source; WRITE on the destination parent
    /// when the entry changes folders.
    pub(crate) fn check_rename_permissions(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        user: &Principal,
    ) -> FolioResult<()> {
        self.check_asset_permission(user, old, ResourceAction::Write)?;
        self.check_asset_permission(user, old, ResourceAction::Delete)?;
        if let Some(new_parent) = new.parent() {
            if old.parent().as_ref() != Some(&new_parent) {
                self.check_asset_permission(user, &new_parent, ResourceAction::Write)?;
            }
        }
        Ok(())
    }

    pub(crate) fn fire(&self, event: AssetEvent) {
        self.events.fire(&event);
    }
}

/// Resolution of a folder child against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildState {
    Present,
    Missing,
    NotAFolder,
    Corrupt,
}

/// Payload errors that traversal repairs instead of raising.
pub(crate) fn is_corrupt_payload(error: &FolioError) -> bool {
    matches!(
        error,
        FolioError::Storage(
            StorageError::Serialization { .. } | StorageError::UnexpectedPayload { .. }
        ) | FolioError::Repository(RepositoryError::FolderRequired { .. })
    )
}

pub(crate) fn invalid_entry(entry: &AssetEntry, reason: &str) -> FolioError {
    RepositoryError::InvalidEntry {
        entry: entry.identifier(),
        reason: reason.to_string(),
    }
    .into()
}

pub(crate) fn not_found(entry: &AssetEntry) -> FolioError {
    RepositoryError::NotFound {
        entry: entry.identifier(),
    }
    .into()
}

impl Drop for AssetRepository {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for AssetRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRepository")
            .field("subscription", &self.subscription)
            .field("events", &self.events)
            .field("config", &self.config)
            .finish()
    }
}

//! Dependency Index Service.
//!
//! A persisted inverted index: for every *target* resource, the entries that
//! reference it. Records live in the same store as assets, under the
//! synthetic key `~dep:<target identifier>`, so the reverse index is itself
//! an asset collection.
//!
//! # Cost model
//!
//! Lookups by target are a single store read. Renaming or deleting a
//! *dependent* has no secondary index to consult, so
//! [`rename_dependencies`](DependencyIndex::rename_dependencies) and
//! [`delete_dependencies`](DependencyIndex::delete_dependencies) scan every
//! record of the organization: O(number of distinct target keys).
//! [`update_dependencies`](DependencyIndex::update_dependencies) avoids the
//! scan for sheets by visiting only the targets the sheet itself names.
//!
//! # Batched mode
//!
//! Edits made with `cache = true` accumulate in an in-memory map and are
//! persisted by [`flush_dependency_map`](DependencyIndex::flush_dependency_map),
//! one task per record, on a bounded pool of worker threads.
//!
//! A flush that times out leaves its workers running. Each worker holds a
//! read guard on the index's settle lock while it writes and gives up once
//! the flush epoch has moved on, and every later store read of a record
//! first takes the write guard. A record written after a timed-out flush is
//! therefore never overwritten by that flush.

use crate::{RenameDependencyInfo, RenameTask, RewriteKind};
use crossbeam_channel::RecvTimeoutError;
use dashmap::DashMap;
use folio_core::{
    AssetEntry, DependencyKind, DependencyRecord, DependencySettings, EntryType, FolioError,
    FolioResult, Payload, Sheet, StorageError,
};
use folio_storage::{KeyFilter, KeyValueStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Instant;

/// Prefix of every reverse-index key.
pub const DEPENDENCY_KEY_PREFIX: &str = "~dep:";

/// Store key of the record for `target`.
pub fn dependency_key(target: &AssetEntry) -> String {
    format!("{}{}", DEPENDENCY_KEY_PREFIX, target.identifier())
}

/// (organization, record key)
type PendingKey = (String, String);

/// Result of one batched flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub persisted: usize,
    pub failed: Vec<(String, FolioError)>,
    /// Records still being written when the wait gave up. Writes that had
    /// not started are abandoned; the rest finish before the index next
    /// reads the store.
    pub outstanding: usize,
    pub timed_out: bool,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.timed_out
    }
}

/// The reverse dependency index.
pub struct DependencyIndex {
    store: Arc<dyn KeyValueStore>,
    pending: DashMap<PendingKey, DependencyRecord>,
    settings: DependencySettings,
    /// Bumped when a flush gives up waiting.
    epoch: Arc<AtomicU64>,
    /// Held shared by flush workers while they write.
    settle: Arc<RwLock<()>>,
}

impl DependencyIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: DependencySettings) -> Self {
        Self {
            store,
            pending: DashMap::new(),
            settings,
            epoch: Arc::new(AtomicU64::new(0)),
            settle: Arc::new(RwLock::new(())),
        }
    }

    /// Number of records waiting for a flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ========================================================================
    // EDGE EDITS
    // ========================================================================

    /// Record that `dependent` references `target`. No-op when present.
    pub fn add_dependency_to_file(
        &self,
        target: &AssetEntry,
        dependent: &AssetEntry,
        kind: DependencyKind,
        cache: bool,
    ) -> FolioResult<bool> {
        self.edit(target, cache, |record| record.add(kind, dependent.clone()))
    }

    /// Forget that `dependent` references `target`. No-op when absent.
    pub fn remove_dependency_from_file(
        &self,
        target: &AssetEntry,
        dependent: &AssetEntry,
        kind: DependencyKind,
        cache: bool,
    ) -> FolioResult<bool> {
        self.edit(target, cache, |record| record.remove(kind, dependent))
    }

    /// Replace dependent `old` with `new` in the record of `target`.
    pub fn rename_dependency_to_file(
        &self,
        target: &AssetEntry,
        old: &AssetEntry,
        new: &AssetEntry,
        cache: bool,
    ) -> FolioResult<bool> {
        self.edit(target, cache, |record| record.rename(old, new))
    }

    /// Dependents of `target`, pending edits included.
    pub fn get_dependencies(&self, target: &AssetEntry) -> FolioResult<DependencyRecord> {
        self.load(target.org_id(), &dependency_key(target))
    }

    fn edit(
        &self,
        target: &AssetEntry,
        cache: bool,
        apply: impl FnOnce(&mut DependencyRecord) -> bool,
    ) -> FolioResult<bool> {
        let org = target.org_id().to_string();
        let key = dependency_key(target);
        let pending_key = (org, key);

        if cache {
            if !self.pending.contains_key(&pending_key) {
                let loaded = self.load_stored(&pending_key.0, &pending_key.1)?;
                self.pending.entry(pending_key.clone()).or_insert(loaded);
            }
            let mut record = self.pending.entry(pending_key).or_default();
            return Ok(apply(&mut *record));
        }

        // Write-through; keep a pending copy coherent if one exists.
        if let Some(mut record) = self.pending.get_mut(&pending_key) {
            let changed = apply(&mut *record);
            if changed {
                self.persist(&pending_key.0, &pending_key.1, &record)?;
            }
            return Ok(changed);
        }

        let mut record = self.load_stored(&pending_key.0, &pending_key.1)?;
        let changed = apply(&mut record);
        if changed {
            self.persist(&pending_key.0, &pending_key.1, &record)?;
        }
        Ok(changed)
    }

    // ========================================================================
    // SHEET LEVEL
    // ========================================================================

    /// Replace the edges `old` registered for `entry` with those of `new`.
    ///
    /// Every edge of the old sheet is removed and every edge of the new one
    /// added, in batched mode, then the batch is flushed.
    pub fn update_sheet_dependencies(
        &self,
        new: Option<&Sheet>,
        old: Option<&Sheet>,
        entry: &AssetEntry,
    ) -> FolioResult<FlushReport> {
        if let Some(old) = old {
            for (target, embed) in old.index_edges() {
                self.remove_dependency_from_file(
                    &target,
                    entry,
                    DependencyKind::from_embed(embed),
                    true,
                )?;
            }
        }
        if let Some(new) = new {
            for (target, embed) in new.index_edges() {
                self.add_dependency_to_file(&target, entry, DependencyKind::from_embed(embed), true)?;
            }
        }
        self.flush_dependency_map()
    }

    /// Persist every pending record and clear the batch.
    ///
    /// Records are written in parallel by at most the configured number of
    /// worker threads. The caller waits up to the configured timeout; on
    /// expiry the remaining writes keep running in the background and the
    /// report says so.
    pub fn flush_dependency_map(&self) -> FolioResult<FlushReport> {
        let keys: Vec<PendingKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        let jobs: Vec<(PendingKey, DependencyRecord)> = keys
            .into_iter()
            .filter_map(|k| self.pending.remove(&k))
            .collect();

        let mut report = FlushReport::default();
        if jobs.is_empty() {
            return Ok(report);
        }

        let total = jobs.len();
        let workers = self.settings.effective_parallelism().clamp(1, total);
        let (job_tx, job_rx) = crossbeam_channel::bounded::<(PendingKey, DependencyRecord)>(total);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<(String, FolioResult<()>)>(total);

        for job in jobs {
            job_tx
                .send(job)
                .map_err(|e| StorageError::Backend { reason: e.to_string() })?;
        }
        drop(job_tx);

        let epoch = self.epoch.load(Ordering::SeqCst);
        for n in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let store = Arc::clone(&self.store);
            let current = Arc::clone(&self.epoch);
            let settle = Arc::clone(&self.settle);
            thread::Builder::new()
                .name(format!("folio-dep-flush-{n}"))
                .spawn(move || {
                    while let Ok(((org, key), record)) = job_rx.recv() {
                        let Ok(_writing) = settle.read() else {
                            break;
                        };
                        if current.load(Ordering::SeqCst) != epoch {
                            break;
                        }
                        let result = store.put(&key, &org, &Payload::Dependencies(record));
                        if done_tx.send((key, result)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| StorageError::Backend { reason: e.to_string() })?;
        }
        drop(done_tx);

        let deadline = Instant::now() + self.settings.flush_timeout();
        let mut received = 0;
        while received < total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match done_rx.recv_timeout(remaining) {
                Ok((_, Ok(()))) => {
                    received += 1;
                    report.persisted += 1;
                }
                Ok((key, Err(e))) => {
                    received += 1;
                    tracing::warn!(key = %key, error = %e, "Failed to persist dependency record");
                    report.failed.push((key, e));
                }
                Err(RecvTimeoutError::Timeout) => {
                    report.timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        report.outstanding = total - received;

        if report.outstanding > 0 {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        if report.timed_out {
            tracing::warn!(
                persisted = report.persisted,
                outstanding = report.outstanding,
                timeout_secs = self.settings.flush_timeout_secs,
                "Dependency flush timed out, continuing"
            );
        } else {
            tracing::info!(
                persisted = report.persisted,
                failed = report.failed.len(),
                workers,
                "Dependency map flushed"
            );
        }
        Ok(report)
    }

    // ========================================================================
    // RENAME / DELETE
    // ========================================================================

    /// Rewrite the index after `old` was renamed to `new`.
    ///
    /// Moves the record of `old` to `new`, then scans every record of the
    /// organization replacing `old` as a dependent. O(distinct target keys).
    pub fn rename_dependencies(&self, old: &AssetEntry, new: &AssetEntry) -> FolioResult<()> {
        self.flush_if_pending()?;
        self.move_record(old, new)?;

        let mut rewritten = 0usize;
        for key in self.record_keys(old.org_id())? {
            let mut record = self.load_stored(old.org_id(), &key)?;
            if record.rename(old, new) {
                self.persist(old.org_id(), &key, &record)?;
                rewritten += 1;
            }
        }
        tracing::debug!(
            old = %old,
            new = %new,
            rewritten,
            "Dependency records renamed"
        );
        Ok(())
    }

    /// Sheet flavour of [`rename_dependencies`](Self::rename_dependencies):
    /// only the targets `sheet` references are visited.
    pub fn update_dependencies(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        sheet: &Sheet,
    ) -> FolioResult<()> {
        self.flush_if_pending()?;
        self.move_record(old, new)?;
        for (target, _) in sheet.index_edges() {
            self.rename_dependency_to_file(&target, old, new, false)?;
        }
        Ok(())
    }

    /// Remove the record of `entry` and every edge naming it.
    /// O(distinct target keys).
    pub fn delete_dependencies(&self, entry: &AssetEntry) -> FolioResult<()> {
        self.flush_if_pending()?;
        let own_key = dependency_key(entry);
        self.store.remove(&own_key, entry.org_id())?;

        for key in self.record_keys(entry.org_id())? {
            let mut record = self.load_stored(entry.org_id(), &key)?;
            if record.remove_all(entry) {
                self.persist(entry.org_id(), &key, &record)?;
            }
        }
        Ok(())
    }

    /// Rewrite work implied by renaming `old` to `new`.
    ///
    /// Reads the record of `old`, falling back to `new` when the record has
    /// already been moved.
    pub fn get_rename_dependency_info(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
    ) -> FolioResult<RenameDependencyInfo> {
        let mut record = self.get_dependencies(old)?;
        if record.is_empty() {
            record = self.get_dependencies(new)?;
        }

        let mut info = RenameDependencyInfo::new();
        for (kind, dependent) in record.iter() {
            info.push(RenameTask {
                target_entry: dependent.clone(),
                rewrite_kind: rewrite_kind(old, dependent, kind),
                old_identifier: old.identifier(),
                new_identifier: new.identifier(),
            });
        }
        Ok(info)
    }

    /// Keys of every reverse-index record of an organization.
    pub fn record_keys(&self, org_id: &str) -> FolioResult<Vec<String>> {
        self.store
            .keys(&KeyFilter::prefix(DEPENDENCY_KEY_PREFIX), org_id)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn move_record(&self, old: &AssetEntry, new: &AssetEntry) -> FolioResult<()> {
        let old_key = dependency_key(old);
        if !self.store.contains(&old_key, old.org_id())? {
            return Ok(());
        }
        let moved = self.load_stored(old.org_id(), &old_key)?;
        let new_key = dependency_key(new);
        let mut merged = self.load_stored(new.org_id(), &new_key)?;
        for (kind, dependent) in moved.iter() {
            merged.add(kind, dependent.clone());
        }
        // New before old.
        self.persist(new.org_id(), &new_key, &merged)?;
        self.store.remove(&old_key, old.org_id())?;
        Ok(())
    }

    fn flush_if_pending(&self) -> FolioResult<()> {
        self.settle()?;
        if !self.pending.is_empty() {
            self.flush_dependency_map()?;
        }
        Ok(())
    }

    fn load(&self, org: &str, key: &str) -> FolioResult<DependencyRecord> {
        if let Some(record) = self.pending.get(&(org.to_string(), key.to_string())) {
            return Ok(record.clone());
        }
        self.load_stored(org, key)
    }

    /// Wait for writes still running from a timed-out flush.
    fn settle(&self) -> FolioResult<()> {
        let _settled = self.settle.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(())
    }

    fn load_stored(&self, org: &str, key: &str) -> FolioResult<DependencyRecord> {
        self.settle()?;
        match self.store.get(key, org)? {
            None => Ok(DependencyRecord::new()),
            Some(Payload::Dependencies(record)) => Ok(record),
            Some(other) => Err(StorageError::UnexpectedPayload {
                key: key.to_string(),
                expected: "dependencies",
                found: other.kind(),
            }
            .into()),
        }
    }

    fn persist(&self, org: &str, key: &str, record: &DependencyRecord) -> FolioResult<()> {
        self.store
            .put(key, org, &Payload::Dependencies(record.clone()))
    }
}

/// Rewrite strategy for one dependent of a renamed target.
pub fn rewrite_kind(target: &AssetEntry, dependent: &AssetEntry, kind: DependencyKind) -> RewriteKind {
    if kind == DependencyKind::Embed {
        return RewriteKind::EmbedViewsheet;
    }
    match dependent.entry_type() {
        EntryType::ScheduleTask => RewriteKind::Viewsheet,
        EntryType::LogicalModel | EntryType::Query | EntryType::Worksheet
            if target.entry_type().is_viewsheet() =>
        {
            RewriteKind::AutoDrill
        }
        _ => RewriteKind::Hyperlink,
    }
}

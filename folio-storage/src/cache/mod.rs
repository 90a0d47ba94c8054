//! Four-tier repository cache with coarse watermark invalidation.
//!
//! Tiers are independent: context (no-data) sheets, full sheets, folders and
//! bookmark sets each have their own capacity and TTL. Readers call
//! [`RepositoryCache::sync`] with the store's current watermark before a
//! lookup; any advance clears every tier. Mutations drop the keys they touch
//! with [`RepositoryCache::invalidate`].

mod key;
mod tier;

pub use key::OrgScopedKey;
pub use tier::{CacheStats, TierCache};

use crate::Watermark;
use folio_core::{BookmarkSet, CacheSettings, Folder, FolioResult, Sheet, StorageError};
use std::sync::{Arc, Mutex};

/// Per-tier statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryCacheStats {
    pub contexts: CacheStats,
    pub sheets: CacheStats,
    pub folders: CacheStats,
    pub bookmarks: CacheStats,
}

/// The repository's cache tiers plus the watermark they were filled at.
pub struct RepositoryCache {
    contexts: TierCache<Arc<Sheet>>,
    sheets: TierCache<Arc<Sheet>>,
    folders: TierCache<Arc<Folder>>,
    bookmarks: TierCache<Arc<BookmarkSet>>,
    watermark: Mutex<Watermark>,
}

impl RepositoryCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            contexts: TierCache::from_settings("contexts", &settings.contexts),
            sheets: TierCache::from_settings("sheets", &settings.sheets),
            folders: TierCache::from_settings("folders", &settings.folders),
            bookmarks: TierCache::from_settings("bookmarks", &settings.bookmarks),
            watermark: Mutex::new(Watermark::zero()),
        }
    }

    pub fn contexts(&self) -> &TierCache<Arc<Sheet>> {
        &self.contexts
    }

    pub fn sheets(&self) -> &TierCache<Arc<Sheet>> {
        &self.sheets
    }

    pub fn folders(&self) -> &TierCache<Arc<Folder>> {
        &self.folders
    }

    pub fn bookmarks(&self) -> &TierCache<Arc<BookmarkSet>> {
        &self.bookmarks
    }

    /// Clear every tier if `current` is newer than the cached watermark.
    /// Returns whether a clear happened.
    pub fn sync(&self, current: Watermark) -> FolioResult<bool> {
        let mut cached = self.watermark.lock().map_err(|_| StorageError::LockPoisoned)?;
        if !current.is_newer_than(&cached) {
            return Ok(false);
        }
        self.clear_tiers()?;
        tracing::debug!(
            from = cached.sequence,
            to = current.sequence,
            "Store watermark advanced, cache cleared"
        );
        *cached = current;
        Ok(true)
    }

    /// Whether the cached watermark already covers `current`.
    pub fn is_current(&self, current: Watermark) -> FolioResult<bool> {
        let cached = self.watermark.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(cached.is_at_least(&current))
    }

    /// Adopt `current` without clearing. Only valid when the caller knows
    /// every change since the cached watermark was its own and already
    /// invalidated.
    pub fn mark_current(&self, current: Watermark) -> FolioResult<()> {
        let mut cached = self.watermark.lock().map_err(|_| StorageError::LockPoisoned)?;
        if current.is_newer_than(&cached) {
            *cached = current;
        }
        Ok(())
    }

    pub fn watermark(&self) -> FolioResult<Watermark> {
        let cached = self.watermark.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(*cached)
    }

    /// Drop one key from every tier.
    pub fn invalidate(&self, key: &OrgScopedKey) -> FolioResult<()> {
        self.contexts.remove(key)?;
        self.sheets.remove(key)?;
        self.folders.remove(key)?;
        self.bookmarks.remove(key)?;
        Ok(())
    }

    pub fn clear(&self) -> FolioResult<()> {
        self.clear_tiers()
    }

    pub fn stats(&self) -> RepositoryCacheStats {
        RepositoryCacheStats {
            contexts: self.contexts.stats(),
            sheets: self.sheets.stats(),
            folders: self.folders.stats(),
            bookmarks: self.bookmarks.stats(),
        }
    }

    fn clear_tiers(&self) -> FolioResult<()> {
        self.contexts.clear()?;
        self.sheets.clear()?;
        self.folders.clear()?;
        self.bookmarks.clear()?;
        Ok(())
    }
}

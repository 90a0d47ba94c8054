//! Viewsheet bookmarks, one set per (viewsheet, user).

use super::{invalid_entry, not_found, AssetRepository, WriteGuard};
use folio_core::{
    bookmark_entry, is_bookmark_of, AssetEntry, BookmarkSet, EntryType, FolioResult, Payload,
    Principal, ResourceAction, StorageError,
};
use folio_events::AssetEvent;
use folio_storage::{KeyFilter, OrgScopedKey};
use std::sync::Arc;

fn validate_viewsheet(entry: &AssetEntry) -> FolioResult<()> {
    if entry.entry_type().is_viewsheet() && !entry.is_root() {
        Ok(())
    } else {
        Err(invalid_entry(entry, "bookmarks belong to viewsheets"))
    }
}

impl AssetRepository {
    /// `user`'s bookmarks on `viewsheet`; empty when none were saved.
    pub fn get_bookmarks(
        &self,
        viewsheet: &AssetEntry,
        user: &Principal,
    ) -> FolioResult<Arc<BookmarkSet>> {
        validate_viewsheet(viewsheet)?;
        self.check_asset_permission(user, viewsheet, ResourceAction::Read)?;
        self.refresh()?;
        let entry = bookmark_entry(viewsheet, &user.identity());
        Ok(self
            .load_bookmarks(&entry)?
            .unwrap_or_else(|| Arc::new(BookmarkSet::new())))
    }

    /// Replace `user`'s bookmarks on `viewsheet`.
    pub fn set_bookmarks(
        &self,
        viewsheet: &AssetEntry,
        user: &Principal,
        bookmarks: BookmarkSet,
    ) -> FolioResult<()> {
        validate_viewsheet(viewsheet)?;
        self.check_asset_permission(user, viewsheet, ResourceAction::Read)?;

        let guard = self.lock()?;
        let was_current = self.begin_write(&guard)?;
        if !self.contains(viewsheet)? {
            return Err(not_found(viewsheet));
        }
        let entry = bookmark_entry(viewsheet, &user.identity());
        self.store_bookmarks(&entry, bookmarks, &guard)?;
        self.end_write(&guard, was_current)?;

        self.fire(AssetEvent::modified(entry));
        Ok(())
    }

    fn load_bookmarks(&self, entry: &AssetEntry) -> FolioResult<Option<Arc<BookmarkSet>>> {
        let key = OrgScopedKey::for_entry(entry);
        if let Some(set) = self.cache.bookmarks().get(&key)? {
            return Ok(Some(set));
        }
        let identifier = entry.identifier();
        match self.store.get(&identifier, entry.org_id())? {
            None => Ok(None),
            Some(Payload::Bookmarks(set)) => {
                let set = Arc::new(set);
                self.cache.bookmarks().insert(key, Arc::clone(&set))?;
                Ok(Some(set))
            }
            Some(other) => Err(StorageError::UnexpectedPayload {
                key: identifier,
                expected: "bookmarks",
                found: other.kind(),
            }
            .into()),
        }
    }

    fn store_bookmarks(
        &self,
        entry: &AssetEntry,
        bookmarks: BookmarkSet,
        _guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        self.store
            .put(&entry.identifier(), entry.org_id(), &Payload::Bookmarks(bookmarks))?;
        self.cache.invalidate(&OrgScopedKey::for_entry(entry))
    }

    /// Bookmark entries of every user on `viewsheet`.
    fn bookmark_family(&self, viewsheet: &AssetEntry) -> FolioResult<Vec<AssetEntry>> {
        let prefix = format!(
            "{}^{}^",
            viewsheet.scope().as_db_str(),
            EntryType::ViewsheetBookmark.as_db_str()
        );
        Ok(self
            .store
            .keys(&KeyFilter::prefix(prefix), viewsheet.org_id())?
            .iter()
            .filter_map(|key| AssetEntry::parse_identifier(key).ok())
            .filter(|candidate| is_bookmark_of(candidate, viewsheet))
            .collect())
    }

    pub(crate) fn rename_bookmarks(
        &self,
        old: &AssetEntry,
        new: &AssetEntry,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        for from in self.bookmark_family(old)? {
            let Some(owner) = from.owner().cloned() else {
                continue;
            };
            let Some(set) = self.load_bookmarks(&from)? else {
                continue;
            };
            let to = bookmark_entry(new, &owner);
            self.store_bookmarks(&to, (*set).clone(), guard)?;
            self.remove_payload(&from, guard)?;
        }
        Ok(())
    }

    pub(crate) fn remove_bookmarks(
        &self,
        viewsheet: &AssetEntry,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        for entry in self.bookmark_family(viewsheet)? {
            self.remove_payload(&entry, guard)?;
        }
        Ok(())
    }

    /// Move `user`'s bookmarks from a transient preview viewsheet to the
    /// viewsheet being saved.
    pub(crate) fn adopt_preview_bookmarks(
        &self,
        preview: &AssetEntry,
        entry: &AssetEntry,
        user: &Principal,
        guard: &WriteGuard<'_>,
    ) -> FolioResult<()> {
        if !entry.entry_type().is_viewsheet() || preview == entry {
            return Ok(());
        }
        let owner = user.identity();
        let from = bookmark_entry(preview, &owner);
        let Some(set) = self.load_bookmarks(&from)? else {
            return Ok(());
        };
        let mut set = (*set).clone();
        set.reassign(&owner);
        self.store_bookmarks(&bookmark_entry(entry, &owner), set, guard)?;
        self.remove_payload(&from, guard)?;
        tracing::debug!(preview = %preview, entry = %entry, "Adopted preview bookmarks");
        Ok(())
    }
}

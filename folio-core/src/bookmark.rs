//! Viewsheet bookmarks, stored per (viewsheet, user).

use crate::{AssetEntry, EntryType, IdentityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Name of the bookmark every set starts with.
pub const HOME_BOOKMARK: &str = "(Home)";

/// A saved viewsheet state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub owner: IdentityId,
    pub created_at: Timestamp,
    /// Opaque captured state.
    #[serde(default)]
    pub state: serde_json::Value,
}

/// All bookmarks one user holds on one viewsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkSet {
    #[serde(default)]
    bookmarks: Vec<Bookmark>,
}

impl BookmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any bookmark with the same name.
    pub fn put(&mut self, bookmark: Bookmark) {
        match self.bookmarks.iter_mut().find(|b| b.name == bookmark.name) {
            Some(existing) => *existing = bookmark,
            None => self.bookmarks.push(bookmark),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Bookmark> {
        let idx = self.bookmarks.iter().position(|b| b.name == name)?;
        Some(self.bookmarks.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.bookmarks.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.bookmarks.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// Rewrite the owner of every bookmark, used when a set is copied to
    /// another user.
    pub fn reassign(&mut self, owner: &IdentityId) {
        for bookmark in &mut self.bookmarks {
            bookmark.owner = owner.clone();
        }
    }
}

/// The entry a user's bookmark set on `viewsheet` is stored under.
pub fn bookmark_entry(viewsheet: &AssetEntry, user: &IdentityId) -> AssetEntry {
    AssetEntry::new(
        viewsheet.scope(),
        EntryType::ViewsheetBookmark,
        viewsheet.path(),
        Some(user.clone()),
        viewsheet.org_id().to_string(),
    )
}

/// Whether `candidate` is a bookmark entry of `viewsheet`, for any user.
pub fn is_bookmark_of(candidate: &AssetEntry, viewsheet: &AssetEntry) -> bool {
    candidate.entry_type() == EntryType::ViewsheetBookmark
        && candidate.scope() == viewsheet.scope()
        && candidate.path() == viewsheet.path()
        && candidate.org_id() == viewsheet.org_id()
}

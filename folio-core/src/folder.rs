//! Folder container: the unit of namespace containment.

use crate::{AssetEntry, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata overlay carried by every child of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub alias: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<Timestamp>,
    pub modified_by: Option<String>,
    pub modified_at: Option<Timestamp>,
    /// Users that marked this child as a favorite.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub favorites: BTreeSet<String>,
}

impl EntryMeta {
    pub fn created(user: &str, at: Timestamp) -> Self {
        Self {
            created_by: Some(user.to_string()),
            created_at: Some(at),
            modified_by: Some(user.to_string()),
            modified_at: Some(at),
            ..Self::default()
        }
    }

    pub fn touch(&mut self, user: &str, at: Timestamp) {
        self.modified_by = Some(user.to_string());
        self.modified_at = Some(at);
    }

    pub fn is_favorite_of(&self, user: &str) -> bool {
        self.favorites.contains(user)
    }
}

/// A child link inside a [`Folder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub entry: AssetEntry,
    #[serde(default)]
    pub meta: EntryMeta,
}

/// Ordered set of child entries. Duplicates by identity are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default)]
    children: Vec<FolderEntry>,
}

impl Folder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child with empty metadata. Returns `false` for a duplicate.
    pub fn add_entry(&mut self, entry: AssetEntry) -> bool {
        self.add_entry_with_meta(entry, EntryMeta::default())
    }

    /// Append a child with the given metadata. Returns `false` for a duplicate.
    pub fn add_entry_with_meta(&mut self, entry: AssetEntry, meta: EntryMeta) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.children.push(FolderEntry { entry, meta });
        true
    }

    /// Unlink a child, handing back its metadata.
    pub fn remove_entry(&mut self, entry: &AssetEntry) -> Option<EntryMeta> {
        let idx = self.position(entry)?;
        Some(self.children.remove(idx).meta)
    }

    /// Swap `old` for `new` in place, keeping position and metadata.
    pub fn replace_entry(&mut self, old: &AssetEntry, new: AssetEntry) -> bool {
        if old != &new && self.contains(&new) {
            return false;
        }
        match self.position(old) {
            Some(idx) => {
                self.children[idx].entry = new;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entry: &AssetEntry) -> bool {
        self.position(entry).is_some()
    }

    pub fn get(&self, entry: &AssetEntry) -> Option<&FolderEntry> {
        self.children.iter().find(|child| &child.entry == entry)
    }

    pub fn meta(&self, entry: &AssetEntry) -> Option<&EntryMeta> {
        self.get(entry).map(|child| &child.meta)
    }

    pub fn meta_mut(&mut self, entry: &AssetEntry) -> Option<&mut EntryMeta> {
        self.children
            .iter_mut()
            .find(|child| &child.entry == entry)
            .map(|child| &mut child.meta)
    }

    /// Child entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &AssetEntry> {
        self.children.iter().map(|child| &child.entry)
    }

    pub fn children(&self) -> &[FolderEntry] {
        &self.children
    }

    /// Child whose last path segment equals `name`, of any type.
    pub fn find_by_name(&self, name: &str) -> Option<&FolderEntry> {
        self.children.iter().find(|child| child.entry.name() == name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Set or clear the alias of a child. Returns `false` if not contained.
    pub fn set_alias(&mut self, entry: &AssetEntry, alias: Option<String>) -> bool {
        match self.meta_mut(entry) {
            Some(meta) => {
                meta.alias = alias.filter(|a| !a.trim().is_empty());
                true
            }
            None => false,
        }
    }

    /// Mark or unmark a child as a favorite of `user`.
    pub fn set_favorite(&mut self, entry: &AssetEntry, user: &str, favorite: bool) -> bool {
        match self.meta_mut(entry) {
            Some(meta) => {
                if favorite {
                    meta.favorites.insert(user.to_string());
                } else {
                    meta.favorites.remove(user);
                }
                true
            }
            None => false,
        }
    }

    /// Flip the favorite flag; returns the new state, `None` if not contained.
    pub fn toggle_favorite(&mut self, entry: &AssetEntry, user: &str) -> Option<bool> {
        let meta = self.meta_mut(entry)?;
        if meta.favorites.remove(user) {
            Some(false)
        } else {
            meta.favorites.insert(user.to_string());
            Some(true)
        }
    }

    fn position(&self, entry: &AssetEntry) -> Option<usize> {
        self.children.iter().position(|child| &child.entry == entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryType, Scope};
    use chrono::Utc;

    fn sheet(path: &str) -> AssetEntry {
        AssetEntry::new(Scope::Global, EntryType::Worksheet, path, None, "o")
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut folder = Folder::new();
        assert!(folder.add_entry(sheet("a/x")));
        assert!(!folder.add_entry(sheet("a/x")));
        assert_eq!(folder.len(), 1);
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut folder = Folder::new();
        for name in ["c", "a", "b"] {
            folder.add_entry(sheet(name));
        }
        let names: Vec<_> = folder.entries().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_remove_returns_meta() {
        let mut folder = Folder::new();
        let meta = EntryMeta::created("alice", Utc::now());
        folder.add_entry_with_meta(sheet("x"), meta.clone());
        assert_eq!(folder.remove_entry(&sheet("x")), Some(meta));
        assert!(folder.is_empty());
        assert!(folder.remove_entry(&sheet("x")).is_none());
    }

    #[test]
    fn test_replace_keeps_meta_and_position() {
        let mut folder = Folder::new();
        folder.add_entry(sheet("a"));
        folder.add_entry(sheet("b"));
        folder.set_favorite(&sheet("a"), "bob", true);

        assert!(folder.replace_entry(&sheet("a"), sheet("z")));
        let first = &folder.children()[0];
        assert_eq!(first.entry, sheet("z"));
        assert!(first.meta.is_favorite_of("bob"));

        assert!(!folder.replace_entry(&sheet("z"), sheet("b")));
    }

    #[test]
    fn test_alias_and_favorites() {
        let mut folder = Folder::new();
        folder.add_entry(sheet("a"));

        assert!(folder.set_alias(&sheet("a"), Some("Alpha".into())));
        assert_eq!(folder.meta(&sheet("a")).unwrap().alias.as_deref(), Some("Alpha"));
        folder.set_alias(&sheet("a"), Some("  ".into()));
        assert!(folder.meta(&sheet("a")).unwrap().alias.is_none());

        assert_eq!(folder.toggle_favorite(&sheet("a"), "u"), Some(true));
        assert_eq!(folder.toggle_favorite(&sheet("a"), "u"), Some(false));
        assert_eq!(folder.toggle_favorite(&sheet("missing"), "u"), None);
        assert!(!folder.set_alias(&sheet("missing"), None));
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut folder = Folder::new();
        folder.add_entry_with_meta(sheet("a"), EntryMeta::created("alice", Utc::now()));
        let bytes = serde_json::to_vec(&folder).unwrap();
        let back: Folder = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, folder);
    }
}

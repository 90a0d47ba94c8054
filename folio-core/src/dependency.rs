//! Reverse-dependency records.
//!
//! One record per *target* resource, listing the entries that reference it.
//! Embed dependents are kept apart from plain ones so rename propagation can
//! tell "links to" from "contains".

use crate::AssetEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which list of a [`DependencyRecord`] an edge lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    Plain,
    Embed,
}

impl DependencyKind {
    pub fn from_embed(embed: bool) -> Self {
        if embed {
            DependencyKind::Embed
        } else {
            DependencyKind::Plain
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Plain => f.write_str("plain"),
            DependencyKind::Embed => f.write_str("embed"),
        }
    }
}

/// Dependents of one target. Empty records are valid and never pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    #[serde(default)]
    dependencies: Vec<AssetEntry>,
    #[serde(default)]
    embed_dependencies: Vec<AssetEntry>,
}

impl DependencyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Returns `false` when it was already present.
    pub fn add(&mut self, kind: DependencyKind, entry: AssetEntry) -> bool {
        let list = self.list_mut(kind);
        if list.contains(&entry) {
            return false;
        }
        list.push(entry);
        true
    }

    /// Remove an edge. Returns `false` when it was absent.
    pub fn remove(&mut self, kind: DependencyKind, entry: &AssetEntry) -> bool {
        let list = self.list_mut(kind);
        let before = list.len();
        list.retain(|e| e != entry);
        list.len() != before
    }

    /// Remove `entry` from both lists.
    pub fn remove_all(&mut self, entry: &AssetEntry) -> bool {
        let plain = self.remove(DependencyKind::Plain, entry);
        let embed = self.remove(DependencyKind::Embed, entry);
        plain || embed
    }

    /// Replace `old` with `new` in both lists, keeping each list free of
    /// duplicates. Returns `false` when `old` was not present.
    pub fn rename(&mut self, old: &AssetEntry, new: &AssetEntry) -> bool {
        let mut changed = false;
        for list in [&mut self.dependencies, &mut self.embed_dependencies] {
            if let Some(idx) = list.iter().position(|e| e == old) {
                if list.contains(new) {
                    list.remove(idx);
                } else {
                    list[idx] = new.clone();
                }
                changed = true;
            }
        }
        changed
    }

    pub fn contains(&self, kind: DependencyKind, entry: &AssetEntry) -> bool {
        self.list(kind).contains(entry)
    }

    pub fn contains_any(&self, entry: &AssetEntry) -> bool {
        self.dependencies.contains(entry) || self.embed_dependencies.contains(entry)
    }

    pub fn dependencies(&self) -> &[AssetEntry] {
        &self.dependencies
    }

    pub fn embed_dependencies(&self) -> &[AssetEntry] {
        &self.embed_dependencies
    }

    /// Every dependent with its edge kind, plain first.
    pub fn iter(&self) -> impl Iterator<Item = (DependencyKind, &AssetEntry)> {
        self.dependencies
            .iter()
            .map(|e| (DependencyKind::Plain, e))
            .chain(
                self.embed_dependencies
                    .iter()
                    .map(|e| (DependencyKind::Embed, e)),
            )
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.embed_dependencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len() + self.embed_dependencies.len()
    }

    fn list(&self, kind: DependencyKind) -> &Vec<AssetEntry> {
        match kind {
            DependencyKind::Plain => &self.dependencies,
            DependencyKind::Embed => &self.embed_dependencies,
        }
    }

    fn list_mut(&mut self, kind: DependencyKind) -> &mut Vec<AssetEntry> {
        match kind {
            DependencyKind::Plain => &mut self.dependencies,
            DependencyKind::Embed => &mut self.embed_dependencies,
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::{EntryType, Scope};
    use proptest::prelude::*;

    fn arb_entry() -> impl Strategy<Value = AssetEntry> {
        "[a-d]{1,2}".prop_map(|p| AssetEntry::new(Scope::Global, EntryType::Worksheet, p, None, "o"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// No sequence of adds produces a duplicate within one list.
        #[test]
        fn prop_lists_stay_unique(entries in prop::collection::vec((arb_entry(), any::<bool>()), 0..20)) {
            let mut record = DependencyRecord::new();
            for (entry, embed) in entries {
                record.add(DependencyKind::from_embed(embed), entry);
            }
            for kind in [DependencyKind::Plain, DependencyKind::Embed] {
                let list = record.list(kind);
                for (i, a) in list.iter().enumerate() {
                    prop_assert!(!list[i + 1..].contains(a));
                }
            }
        }

        /// Removing an edge twice leaves the same state as removing it once.
        #[test]
        fn prop_remove_idempotent(
            entries in prop::collection::vec(arb_entry(), 0..10),
            victim in arb_entry(),
        ) {
            let mut record = DependencyRecord::new();
            for entry in entries {
                record.add(DependencyKind::Plain, entry);
            }
            let mut once = record.clone();
            once.remove(DependencyKind::Plain, &victim);
            let mut twice = once.clone();
            twice.remove(DependencyKind::Plain, &victim);
            prop_assert_eq!(once, twice);
        }
    }
}

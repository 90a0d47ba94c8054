//! Asset event values.

use chrono::Utc;
use folio_core::{AssetEntry, EntryType, Payload, Timestamp};
use std::fmt;
use std::sync::Arc;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetChange {
    Added,
    /// Also used, with no old identifier, when a folder is created.
    Renamed,
    Modified,
    Deleted,
    ToBeDeleted,
}

impl AssetChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetChange::Added => "added",
            AssetChange::Renamed => "renamed",
            AssetChange::Modified => "modified",
            AssetChange::Deleted => "deleted",
            AssetChange::ToBeDeleted => "to_be_deleted",
        }
    }
}

impl fmt::Display for AssetChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivered to every registered listener.
#[derive(Debug, Clone)]
pub struct AssetEvent {
    pub entry_type: EntryType,
    pub change: AssetChange,
    pub entry: AssetEntry,
    pub old_identifier: Option<String>,
    pub is_root: bool,
    pub payload: Option<Arc<Payload>>,
    pub occurred_at: Timestamp,
}

impl AssetEvent {
    pub fn new(change: AssetChange, entry: AssetEntry) -> Self {
        Self {
            entry_type: entry.entry_type(),
            change,
            is_root: entry.is_root(),
            entry,
            old_identifier: None,
            payload: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn added(entry: AssetEntry) -> Self {
        Self::new(AssetChange::Added, entry)
    }

    /// `old` is `None` for a newly created folder.
    pub fn renamed(entry: AssetEntry, old: Option<&AssetEntry>) -> Self {
        let mut event = Self::new(AssetChange::Renamed, entry);
        event.old_identifier = old.map(AssetEntry::identifier);
        event
    }

    pub fn modified(entry: AssetEntry) -> Self {
        Self::new(AssetChange::Modified, entry)
    }

    pub fn deleted(entry: AssetEntry) -> Self {
        Self::new(AssetChange::Deleted, entry)
    }

    pub fn to_be_deleted(entry: AssetEntry) -> Self {
        Self::new(AssetChange::ToBeDeleted, entry)
    }

    pub fn with_payload(mut self, payload: Arc<Payload>) -> Self {
        self.payload = Some(payload);
        self
    }
}

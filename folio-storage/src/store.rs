//! The store adapter contract.
//!
//! The repository talks to its persistent key/value store only through
//! [`KeyValueStore`]. Keys are entry identifiers (or synthetic reverse-index
//! keys), values are [`Payload`]s, and every call is partitioned by
//! organization. Only single-key atomicity is assumed.

use crate::Watermark;
use folio_core::{FolioResult, Payload};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Kind of a change reported by a refresh notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One key changed by another writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChange {
    pub key: String,
    pub org_id: String,
    pub kind: ChangeKind,
}

/// Key enumeration filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Prefix(String),
    Contains(String),
}

impl KeyFilter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        KeyFilter::Prefix(prefix.into())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyFilter::Contains(part) => key.contains(part.as_str()),
        }
    }
}

/// Handle returned by [`KeyValueStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback receiving batches of refresh notifications.
pub type StoreListener = Arc<dyn Fn(&[StoreChange]) + Send + Sync>;

/// Persistent key/value store partitioned by organization.
///
/// Refresh notifications report changes made by *other* writers (another
/// node of a cluster, an import job). Writes made through this handle are
/// not echoed back.
pub trait KeyValueStore: Send + Sync {
    /// Read and decode the value at `key`.
    fn get(&self, key: &str, org_id: &str) -> FolioResult<Option<Payload>>;

    /// Write `payload` at `key`, replacing any previous value.
    fn put(&self, key: &str, org_id: &str, payload: &Payload) -> FolioResult<()>;

    /// Delete `key`. Returns whether a value was present.
    fn remove(&self, key: &str, org_id: &str) -> FolioResult<bool>;

    fn contains(&self, key: &str, org_id: &str) -> FolioResult<bool>;

    /// Enumerate the keys of one organization matching `filter`.
    fn keys(&self, filter: &KeyFilter, org_id: &str) -> FolioResult<Vec<String>>;

    /// Watermark advanced by every mutation, local or external.
    fn last_modified(&self) -> Watermark;

    fn subscribe(&self, listener: StoreListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

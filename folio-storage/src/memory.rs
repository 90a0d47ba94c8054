//! In-memory store for tests and single-process embedding.

use crate::{
    ChangeKind, KeyFilter, KeyValueStore, StoreChange, StoreListener, SubscriptionId, Watermark,
};
use folio_core::{FolioResult, Payload, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

type OrgMap = HashMap<String, HashMap<String, Vec<u8>>>;

/// [`KeyValueStore`] keeping JSON-encoded payloads in memory.
///
/// Values round-trip through `serde_json`, so anything marked
/// `#[serde(skip)]` is dropped on write exactly as it would be by a
/// persistent backend.
#[derive(Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<OrgMap>>,
    watermark: Arc<RwLock<Watermark>>,
    listeners: Arc<RwLock<Vec<(SubscriptionId, StoreListener)>>>,
    writes: AtomicU64,
    reads: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put`/`remove` calls served.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `get` calls served.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Total number of keys across all organizations.
    pub fn len(&self) -> FolioResult<usize> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.values().map(HashMap::len).sum())
    }

    pub fn is_empty(&self) -> FolioResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Write raw bytes, bypassing encoding. Used to plant corrupt values.
    pub fn put_raw(&self, key: &str, org_id: &str, bytes: Vec<u8>) -> FolioResult<()> {
        self.write_bytes(key, org_id, Some(bytes))?;
        Ok(())
    }

    /// Apply a change as if another node had written it, then notify
    /// subscribers. `None` removes the key.
    pub fn inject_external_change(
        &self,
        key: &str,
        org_id: &str,
        payload: Option<&Payload>,
    ) -> FolioResult<()> {
        let bytes = payload.map(|p| encode(key, p)).transpose()?;
        let removing = bytes.is_none();
        let existed = self.write_bytes(key, org_id, bytes)?;

        let kind = match (removing, existed) {
            (true, _) => ChangeKind::Removed,
            (false, true) => ChangeKind::Modified,
            (false, false) => ChangeKind::Added,
        };
        self.notify(&[StoreChange {
            key: key.to_string(),
            org_id: org_id.to_string(),
            kind,
        }])
    }

    fn write_bytes(&self, key: &str, org_id: &str, bytes: Option<Vec<u8>>) -> FolioResult<bool> {
        let existed = {
            let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
            match bytes {
                Some(bytes) => data
                    .entry(org_id.to_string())
                    .or_default()
                    .insert(key.to_string(), bytes)
                    .is_some(),
                None => data
                    .get_mut(org_id)
                    .and_then(|org| org.remove(key))
                    .is_some(),
            }
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.advance()?;
        Ok(existed)
    }

    fn advance(&self) -> FolioResult<()> {
        let mut watermark = self.watermark.write().map_err(|_| StorageError::LockPoisoned)?;
        *watermark = watermark.next();
        Ok(())
    }

    fn notify(&self, changes: &[StoreChange]) -> FolioResult<()> {
        // Snapshot so listeners run without the registry lock held.
        let listeners: Vec<StoreListener> = {
            let guard = self.listeners.read().map_err(|_| StorageError::LockPoisoned)?;
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        tracing::debug!(
            changes = changes.len(),
            listeners = listeners.len(),
            "Delivering store refresh notification"
        );
        for listener in listeners {
            listener(changes);
        }
        Ok(())
    }
}

fn encode(key: &str, payload: &Payload) -> FolioResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| {
        StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str, org_id: &str) -> FolioResult<Option<Payload>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(bytes) = data.get(org_id).and_then(|org| org.get(key)) else {
            return Ok(None);
        };
        let payload = serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(payload))
    }

    fn put(&self, key: &str, org_id: &str, payload: &Payload) -> FolioResult<()> {
        let bytes = encode(key, payload)?;
        self.write_bytes(key, org_id, Some(bytes))?;
        Ok(())
    }

    fn remove(&self, key: &str, org_id: &str) -> FolioResult<bool> {
        self.write_bytes(key, org_id, None)
    }

    fn contains(&self, key: &str, org_id: &str) -> FolioResult<bool> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.get(org_id).is_some_and(|org| org.contains_key(key)))
    }

    fn keys(&self, filter: &KeyFilter, org_id: &str) -> FolioResult<Vec<String>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut keys: Vec<String> = data
            .get(org_id)
            .map(|org| org.keys().filter(|k| filter.matches(k)).cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn last_modified(&self) -> Watermark {
        self.watermark
            .read()
            .map(|w| *w)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn subscribe(&self, listener: StoreListener) -> SubscriptionId {
        let id = SubscriptionId::new();
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(poisoned) => poisoned.into_inner().push((id, listener)),
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Folder, FolioError, Sheet};
    use std::sync::Mutex;

    #[test]
    fn test_put_get_remove() {
        let store = InMemoryStore::new();
        let payload = Payload::Folder(Folder::new());
        store.put("k", "o", &payload).unwrap();

        assert_eq!(store.get("k", "o").unwrap(), Some(payload));
        assert!(store.contains("k", "o").unwrap());
        assert!(!store.contains("k", "other-org").unwrap());
        assert!(store.remove("k", "o").unwrap());
        assert!(!store.remove("k", "o").unwrap());
        assert!(store.get("k", "o").unwrap().is_none());
    }

    #[test]
    fn test_watermark_advances_on_every_write() {
        let store = InMemoryStore::new();
        let start = store.last_modified();
        store.put("a", "o", &Payload::Snapshot(vec![1])).unwrap();
        let after_put = store.last_modified();
        store.remove("a", "o").unwrap();
        assert!(after_put.is_newer_than(&start));
        assert!(store.last_modified().is_newer_than(&after_put));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_keys_filtered_and_partitioned() {
        let store = InMemoryStore::new();
        let p = Payload::Snapshot(vec![]);
        store.put("~dep:x", "o", &p).unwrap();
        store.put("~dep:y", "o", &p).unwrap();
        store.put("global^Folder^__NULL__^^o", "o", &p).unwrap();
        store.put("~dep:z", "other", &p).unwrap();

        let keys = store.keys(&KeyFilter::prefix("~dep:"), "o").unwrap();
        assert_eq!(keys, vec!["~dep:x", "~dep:y"]);
        assert_eq!(store.keys(&KeyFilter::All, "nobody").unwrap().len(), 0);
    }

    #[test]
    fn test_ephemeral_fields_dropped() {
        let store = InMemoryStore::new();
        let mut sheet = Sheet::default();
        sheet.runtime_info = Some(Default::default());
        store.put("s", "o", &Payload::sheet(sheet)).unwrap();
        let back = store.get("s", "o").unwrap().unwrap().into_sheet().unwrap();
        assert!(back.runtime_info.is_none());
    }

    #[test]
    fn test_corrupt_bytes_surface_as_serialization_error() {
        let store = InMemoryStore::new();
        store.put_raw("bad", "o", b"{not json".to_vec()).unwrap();
        let err = store.get("bad", "o").unwrap_err();
        assert!(matches!(err, FolioError::Storage(StorageError::Serialization { .. })));
    }

    #[test]
    fn test_external_changes_notify_subscribers() {
        let store = InMemoryStore::new();
        let seen: Arc<Mutex<Vec<StoreChange>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let id = store.subscribe(Arc::new(move |changes: &[StoreChange]| {
            sink.lock().unwrap().extend_from_slice(changes);
        }));

        let p = Payload::Snapshot(vec![]);
        store.put("local", "o", &p).unwrap();
        store.inject_external_change("k", "o", Some(&p)).unwrap();
        store.inject_external_change("k", "o", Some(&p)).unwrap();
        store.inject_external_change("k", "o", None).unwrap();

        let kinds: Vec<ChangeKind> = seen.lock().unwrap().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.inject_external_change("k", "o", Some(&p)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}

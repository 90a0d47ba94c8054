//! A single bounded, time-expiring cache tier.

use super::OrgScopedKey;
use folio_core::{FolioResult, StorageError, TierSettings};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct TierState<V> {
    entries: HashMap<OrgScopedKey, (V, Instant)>,
    /// Insertion order, oldest first.
    order: VecDeque<OrgScopedKey>,
}

/// Capacity-bounded map whose entries expire after a TTL.
///
/// When full, the oldest insertion is evicted.
pub struct TierCache<V> {
    name: &'static str,
    capacity: usize,
    ttl: Duration,
    state: Mutex<TierState<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> TierCache<V> {
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(TierState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn from_settings(name: &'static str, settings: &TierSettings) -> Self {
        Self::new(name, settings.capacity, settings.ttl())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &OrgScopedKey) -> FolioResult<Option<V>> {
        let mut state = self.lock()?;
        let expired = match state.entries.get(key) {
            Some((value, inserted)) if inserted.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    pub fn insert(&self, key: OrgScopedKey, value: V) -> FolioResult<()> {
        let mut state = self.lock()?;
        if state.entries.contains_key(&key) {
            state.order.retain(|k| k != &key);
        } else {
            while state.entries.len() >= self.capacity {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, (value, Instant::now()));
        Ok(())
    }

    pub fn remove(&self, key: &OrgScopedKey) -> FolioResult<Option<V>> {
        let mut state = self.lock()?;
        let removed = state.entries.remove(key).map(|(v, _)| v);
        if removed.is_some() {
            state.order.retain(|k| k != key);
        }
        Ok(removed)
    }

    pub fn clear(&self) -> FolioResult<()> {
        let mut state = self.lock()?;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
        }
    }

    fn lock(&self) -> FolioResult<MutexGuard<'_, TierState<V>>> {
        self.state
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A tier never holds more entries than its capacity.
        #[test]
        fn prop_capacity_respected(
            capacity in 1usize..8,
            keys in prop::collection::vec("[a-j]", 0..40),
        ) {
            let tier = TierCache::new("t", capacity, Duration::from_secs(60));
            for k in keys {
                tier.insert(OrgScopedKey::new("o", k), ()).unwrap();
                prop_assert!(tier.len() <= capacity);
            }
        }
    }
}

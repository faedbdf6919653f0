//! crates/mangashelf_core/src/cache.rs
//!
//! An injectable in-memory key/value cache with an optional time-to-live and
//! an optional capacity bound. Used for the gateway response caches and the
//! title-mapping cache; each owner receives its own instance so tests can
//! start from an empty cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Option<Duration>,
    capacity: Option<usize>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A cache whose entries expire `ttl` after insertion. Unbounded in size.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(Some(ttl), None)
    }

    /// A cache whose entries never expire.
    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    pub fn new(ttl: Option<Duration>, capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // The map holds no invariant a panicking writer could break.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .map(|ttl| entry.inserted_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    /// Returns a live entry, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key).map(|entry| self.is_expired(entry)) {
            Some(false) => entries.get(key).map(|entry| entry.value.clone()),
            Some(true) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.lock();
        if let Some(capacity) = self.capacity {
            if !entries.contains_key(&key) && entries.len() >= capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// TTL caches. One structure backs both the snapshot cache and the per-source caches.
// Eviction is by insertion order, not access recency.

use indexmap::IndexMap;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::identity::Identity;
use crate::models::Snapshot;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: Mutex<IndexMap<K, Entry<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns a clone of a live entry. An entry is live until strictly more than `ttl` has
    /// elapsed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(e) => e.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            entries.shift_remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    /// Inserts as the newest entry. At capacity the oldest inserted entry is evicted first.
    pub fn insert(&self, key: K, value: V) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!(operation = "cache_insert", "cache lock poisoned; entry dropped");
            return;
        };
        entries.shift_remove(&key);
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.inserted_at) <= self.ttl);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity-scoped snapshot cache keyed by (hash of identity, diagram id).
/// Anonymous requests never read or write it.
pub struct SnapshotCache {
    inner: TtlCache<(String, String), Snapshot>,
}

impl SnapshotCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
    pub const DEFAULT_CAPACITY: usize = 20;

    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: TtlCache::new(ttl, capacity),
        }
    }

    pub fn get(&self, identity: Option<&Identity>, diagram_id: &str) -> Option<Snapshot> {
        let identity = identity?;
        self.inner.get(&(identity.hash(), diagram_id.to_string()))
    }

    pub fn insert(&self, identity: Option<&Identity>, diagram_id: &str, snapshot: Snapshot) {
        let Some(identity) = identity else {
            return;
        };
        self.inner
            .insert((identity.hash(), diagram_id.to_string()), snapshot);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY)
    }
}

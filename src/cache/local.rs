use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use tokio::time::Instant;

struct LocalEntry {
    payload: Arc<str>,
    expires_at: Instant,
}

impl LocalEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local tier: a sharded map of serialized payloads with
/// per-entry absolute expiry.
///
/// Every shard has its own lock, so a sweep only ever blocks one shard at
/// a time and never holds a lock across the whole key space.
pub struct LocalCache {
    shards: Box<[RwLock<FxHashMap<String, LocalEntry>>]>,
}

impl LocalCache {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards)
                .map(|_| RwLock::new(FxHashMap::default()))
                .collect(),
        }
    }

    fn shard(&self, key: &str) -> &RwLock<FxHashMap<String, LocalEntry>> {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Live payload for `key`. An expired entry reads as a miss and is
    /// dropped on the spot.
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        let shard = self.shard(key);

        {
            let guard = shard.read();
            match guard.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.payload.clone()),
                Some(_) => {},
                None => return None,
            }
        }

        // Re-check under the write lock: a concurrent set may have refreshed it
        let mut guard = shard.write();
        if guard.get(key).is_some_and(|entry| !entry.is_live(now)) {
            guard.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, payload: Arc<str>, ttl: Duration) {
        let entry = LocalEntry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        self.shard(&key).write().insert(key, entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.shard(key).write().remove(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            let before = guard.len();
            guard.retain(|key, _| !key.starts_with(prefix));
            removed += before - guard.len();
        }
        removed
    }

    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            removed += guard.len();
            guard.clear();
        }
        removed
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries shard by shard, yielding between shards.
    pub async fn sweep(&self) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let now = Instant::now();
            {
                let mut guard = shard.write();
                let before = guard.len();
                guard.retain(|_, entry| entry.is_live(now));
                removed += before - guard.len();
            }
            tokio::task::yield_now().await;
        }
        removed
    }
}

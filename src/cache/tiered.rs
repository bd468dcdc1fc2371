use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;

use super::local::LocalCache;
use super::namespace::{CacheLevel, Namespace};
use super::shared::SharedCache;
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::CacheSettings;

/// Shared-tier wire format: the serialized value plus its absolute expiry.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    expires_at_ms: u64,
    value: &'a T,
}

#[derive(Deserialize)]
struct StoredEnvelope {
    expires_at_ms: u64,
    value: serde_json::Value,
}

/// Two-tier read-through / write-through cache.
///
/// Reads try the process-local tier, then the shared tier, backfilling the
/// local tier on a shared hit. Writes go to both tiers. Every shared-tier
/// failure (transport, timeout, bad payload) is logged, counted and
/// swallowed: callers only ever observe a miss.
///
/// Writes are last-write-wins per key. A `get` racing a `set` of the same
/// key from another caller may or may not observe it.
pub struct TieredCache {
    local: Arc<LocalCache>,
    shared: Arc<dyn SharedCache>,
    settings: CacheSettings,
    stats: Arc<CacheStats>,
    started: Instant,
    wall_start_ms: u64,
    last_sweep_ms: AtomicU64,
}

impl TieredCache {
    pub fn new(settings: CacheSettings, shared: Arc<dyn SharedCache>) -> Self {
        let wall_start_ms = Utc::now().timestamp_millis().max(0) as u64;

        Self {
            local: Arc::new(LocalCache::new(settings.local_shards)),
            shared,
            settings,
            stats: Arc::new(CacheStats::default()),
            started: Instant::now(),
            wall_start_ms,
            last_sweep_ms: AtomicU64::new(wall_start_ms),
        }
    }

    /// Wall-clock milliseconds, advanced by the tokio clock so that expiry
    /// follows paused time in tests.
    fn now_ms(&self) -> u64 {
        self.wall_start_ms + self.started.elapsed().as_millis() as u64
    }

    fn shared_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.shared_timeout_ms)
    }

    pub fn default_ttl(&self, namespace: Namespace) -> Duration {
        namespace.default_ttl(&self.settings.ttl)
    }

    /// Staleness bound for values that carry their own timestamp.
    pub fn medium_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.medium_ttl_secs)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) -> CacheStatsSnapshot {
        self.stats.reset()
    }

    /// Run a shared-tier call under the round-trip timeout, flattening
    /// transport errors and timeouts into `None`.
    async fn shared_call<R, F>(&self, op: &str, call: F) -> Option<R>
    where
        F: Future<Output = anyhow::Result<R>>,
    {
        match tokio::time::timeout(self.shared_timeout(), call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.stats.shared.error();
                warn!("Shared cache {} failed: {:#}", op, e);
                None
            },
            Err(_) => {
                self.stats.shared.error();
                warn!(
                    "Shared cache {} timed out after {}ms",
                    op, self.settings.shared_timeout_ms
                );
                None
            },
        }
    }

    /// Decode a shared-tier envelope. Returns the value payload and the
    /// remaining lifetime, or `None` if malformed or already expired.
    fn open_envelope(&self, key: &str, raw: &str) -> Option<(String, Duration)> {
        let envelope: StoredEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.shared.error();
                warn!("Discarding malformed shared cache entry {}: {}", key, e);
                return None;
            },
        };

        let now = self.now_ms();
        if envelope.expires_at_ms <= now {
            return None;
        }

        Some((
            envelope.value.to_string(),
            Duration::from_millis(envelope.expires_at_ms - now),
        ))
    }

    fn decode_local<T: DeserializeOwned>(&self, key: &str, payload: &str) -> Option<T> {
        match serde_json::from_str(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                // A type change under the same key; drop it so it is recomputed
                debug!("Dropping undecodable cache entry {}: {}", key, e);
                self.local.remove(key);
                None
            },
        }
    }

    /// Accept a live shared payload: backfill the local tier and decode.
    fn accept_shared<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        let Some((payload, remaining)) = self.open_envelope(key, raw) else {
            self.stats.shared.miss();
            return None;
        };

        let value = match serde_json::from_str::<T>(&payload) {
            Ok(value) => value,
            Err(e) => {
                self.stats.shared.error();
                warn!("Shared cache entry {} has unexpected shape: {}", key, e);
                return None;
            },
        };

        self.stats.shared.hit();
        self.local.insert(key.to_string(), Arc::from(payload), remaining);
        Some(value)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        id: &str,
        sub_key: Option<&str>,
    ) -> Option<T> {
        let key = namespace.key(id, sub_key);

        if let Some(payload) = self.local.get(&key) {
            if let Some(value) = self.decode_local(&key, &payload) {
                self.stats.local.hit();
                return Some(value);
            }
        }
        self.stats.local.miss();

        match self.shared_call("get", self.shared.get(&key)).await? {
            Some(raw) => self.accept_shared(&key, &raw),
            None => {
                self.stats.shared.miss();
                None
            },
        }
    }

    /// Write to both tiers. `ttl` defaults to the namespace TTL.
    pub async fn set<T: Serialize>(
        &self,
        namespace: Namespace,
        id: &str,
        value: &T,
        ttl: Option<Duration>,
        sub_key: Option<&str>,
    ) {
        let key = namespace.key(id, sub_key);
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(namespace));

        let Some((payload, envelope)) = self.seal(&key, value, ttl) else {
            return;
        };

        self.local.insert(key.clone(), Arc::from(payload), ttl);
        self.stats.local.set(1);
        self.schedule_sweep();

        if self
            .shared_call("set", self.shared.set(&key, envelope, ttl))
            .await
            .is_some()
        {
            self.stats.shared.set(1);
        }
    }

    /// Serialize a value into its local payload and its shared envelope.
    fn seal<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Option<(String, String)> {
        let expires_at_ms = self.now_ms() + ttl.as_millis() as u64;
        let encoded = serde_json::to_string(value).and_then(|payload| {
            serde_json::to_string(&Envelope {
                expires_at_ms,
                value,
            })
            .map(|envelope| (payload, envelope))
        });

        match encoded {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!("Failed to serialize cache value for {}: {}", key, e);
                None
            },
        }
    }

    /// Batch read. Local misses are fetched from the shared tier in one
    /// multi-get. Ids without a live entry are absent from the result.
    pub async fn get_bulk<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        ids: &[String],
    ) -> FxHashMap<String, T> {
        let mut found = FxHashMap::default();
        let mut missing_ids = Vec::new();
        let mut missing_keys = Vec::new();

        for id in ids {
            let key = namespace.key(id, None);
            let local = self
                .local
                .get(&key)
                .and_then(|payload| self.decode_local::<T>(&key, &payload));

            match local {
                Some(value) => {
                    self.stats.local.hit();
                    found.insert(id.clone(), value);
                },
                None => {
                    self.stats.local.miss();
                    missing_ids.push(id.clone());
                    missing_keys.push(key);
                },
            }
        }

        if missing_keys.is_empty() {
            return found;
        }

        let Some(values) = self
            .shared_call("mget", self.shared.mget(&missing_keys))
            .await
        else {
            return found;
        };

        for ((id, key), raw) in missing_ids.into_iter().zip(missing_keys).zip(values) {
            match raw {
                Some(raw) => {
                    if let Some(value) = self.accept_shared(&key, &raw) {
                        found.insert(id, value);
                    }
                },
                None => self.stats.shared.miss(),
            }
        }

        found
    }

    /// Batch write. The shared tier receives a single pipelined call.
    pub async fn set_bulk<T: Serialize>(
        &self,
        namespace: Namespace,
        entries: &[(String, T)],
        ttl: Option<Duration>,
    ) {
        if entries.is_empty() {
            return;
        }

        let ttl = ttl.unwrap_or_else(|| self.default_ttl(namespace));
        let mut pipeline = Vec::with_capacity(entries.len());

        for (id, value) in entries {
            let key = namespace.key(id, None);
            let Some((payload, envelope)) = self.seal(&key, value, ttl) else {
                continue;
            };
            self.local.insert(key.clone(), Arc::from(payload), ttl);
            pipeline.push((key, envelope, ttl));
        }

        let written = pipeline.len() as u64;
        self.stats.local.set(written);
        self.schedule_sweep();

        if self
            .shared_call("pipeline set", self.shared.pipeline_set(pipeline))
            .await
            .is_some()
        {
            self.stats.shared.set(written);
        }
    }

    pub async fn invalidate(&self, namespace: Namespace, id: &str, sub_key: Option<&str>) {
        let key = namespace.key(id, sub_key);
        if self.local.remove(&key) {
            self.stats.local.invalidated(1);
        }
        if let Some(removed) = self.shared_call("del", self.shared.del(&[key])).await {
            self.stats.shared.invalidated(removed);
        }
    }

    pub async fn invalidate_bulk(&self, namespace: Namespace, ids: &[String]) {
        if ids.is_empty() {
            return;
        }

        let keys: Vec<String> = ids.iter().map(|id| namespace.key(id, None)).collect();
        let local_removed = keys.iter().filter(|key| self.local.remove(key)).count();
        self.stats.local.invalidated(local_removed as u64);

        if let Some(removed) = self.shared_call("del", self.shared.del(&keys)).await {
            self.stats.shared.invalidated(removed);
        }
    }

    /// Drop every entry whose key starts with `namespace:` followed by
    /// `id_prefix` (the whole namespace when `None`).
    pub async fn invalidate_by_prefix(&self, namespace: Namespace, id_prefix: Option<&str>) {
        let prefix = format!("{}{}", namespace.prefix(), id_prefix.unwrap_or(""));

        let local_removed = self.local.remove_prefix(&prefix);
        self.stats.local.invalidated(local_removed as u64);

        self.drop_shared_matching(&format!("{}*", prefix)).await;
    }

    async fn drop_shared_matching(&self, pattern: &str) {
        let Some(keys) = self.shared_call("scan", self.shared.scan(pattern)).await else {
            return;
        };
        if keys.is_empty() {
            return;
        }
        if let Some(removed) = self.shared_call("del", self.shared.del(&keys)).await {
            self.stats.shared.invalidated(removed);
        }
    }

    /// Flush one or both tiers. Only keys of known namespaces are removed
    /// from the shared tier.
    pub async fn clear_all(&self, level: CacheLevel) {
        if level.includes_local() {
            let removed = self.local.clear();
            self.stats.local.invalidated(removed as u64);
        }

        if level.includes_shared() {
            for namespace in Namespace::ALL {
                self.drop_shared_matching(&format!("{}*", namespace.prefix()))
                    .await;
            }
        }
    }

    /// Spawn a sweep of expired local entries, at most once per
    /// `sweep_interval_secs`. Never blocks the caller.
    fn schedule_sweep(&self) {
        let now = self.now_ms();
        let interval_ms = self.settings.sweep_interval_secs * 1_000;
        let last = self.last_sweep_ms.load(Ordering::Relaxed);

        if now.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // another caller won the slot
            return;
        }

        let local = self.local.clone();
        tokio::spawn(async move {
            let removed = local.sweep().await;
            if removed > 0 {
                debug!("Swept {} expired local cache entries", removed);
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn local_len(&self) -> usize {
        self.local.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::shared::MemorySharedCache;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Shared tier that counts calls and can be switched to fail.
    #[derive(Default)]
    pub(crate) struct CountingShared {
        inner: Option<MemorySharedCache>,
        pub calls: AtomicUsize,
    }

    impl CountingShared {
        pub(crate) fn working() -> Self {
            Self {
                inner: Some(MemorySharedCache::new(1_000)),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self::default()
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn inner(&self) -> Result<&MemorySharedCache> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.as_ref().ok_or_else(|| anyhow!("connection refused"))
        }
    }

    #[async_trait]
    impl SharedCache for CountingShared {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner()?.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
            self.inner()?.set(key, value, ttl).await
        }

        async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            self.inner()?.mget(keys).await
        }

        async fn pipeline_set(&self, entries: Vec<(String, String, Duration)>) -> Result<()> {
            self.inner()?.pipeline_set(entries).await
        }

        async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
            self.inner()?.scan(pattern).await
        }

        async fn del(&self, keys: &[String]) -> Result<u64> {
            self.inner()?.del(keys).await
        }
    }

    fn cache_with(shared: Arc<CountingShared>) -> TieredCache {
        TieredCache::new(CacheSettings::default(), shared)
    }

    #[tokio::test]
    async fn test_set_then_get_is_served_locally() {
        let shared = Arc::new(CountingShared::working());
        let cache = cache_with(shared.clone());

        cache.set(Namespace::Price, "kkub", &2.0_f64, None, None).await;
        let calls_after_set = shared.calls();

        let value: Option<f64> = cache.get(Namespace::Price, "kkub", None).await;
        assert_eq!(value, Some(2.0));
        assert_eq!(shared.calls(), calls_after_set);

        let stats = cache.stats();
        assert_eq!(stats.local.hits, 1);
        assert_eq!(stats.local.sets, 1);
        assert_eq!(stats.shared.sets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = cache_with(Arc::new(CountingShared::working()));
        let ttl = Duration::from_secs(10);

        cache
            .set(Namespace::Token, "t1", &"meta".to_string(), Some(ttl), None)
            .await;

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let hit: Option<String> = cache.get(Namespace::Token, "t1", None).await;
        assert_eq!(hit.as_deref(), Some("meta"));

        tokio::time::advance(Duration::from_millis(2)).await;
        // the local entry is gone and the shared envelope is expired too
        let miss: Option<String> = cache.get(Namespace::Token, "t1", None).await;
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_shared_hit_backfills_local() {
        let shared = Arc::new(CountingShared::working());
        let writer = cache_with(shared.clone());
        let reader = cache_with(shared.clone());

        writer
            .set(Namespace::Pair, "p1", &vec![1_u32, 2, 3], None, None)
            .await;

        let first: Option<Vec<u32>> = reader.get(Namespace::Pair, "p1", None).await;
        assert_eq!(first, Some(vec![1, 2, 3]));
        assert_eq!(reader.stats().shared.hits, 1);

        let calls = shared.calls();
        let second: Option<Vec<u32>> = reader.get(Namespace::Pair, "p1", None).await;
        assert_eq!(second, Some(vec![1, 2, 3]));
        assert_eq!(shared.calls(), calls);
        assert_eq!(reader.stats().local.hits, 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix_always_misses() {
        let shared = Arc::new(CountingShared::working());
        let cache = cache_with(shared.clone());
        let other = cache_with(shared);

        for id in ["a", "b", "c"] {
            cache.set(Namespace::Chart, id, &1.0_f64, None, Some("1d:0")).await;
        }
        cache.set(Namespace::Price, "a", &1.0_f64, None, None).await;

        cache.invalidate_by_prefix(Namespace::Chart, None).await;

        for id in ["a", "b", "c"] {
            let local: Option<f64> = cache.get(Namespace::Chart, id, Some("1d:0")).await;
            let remote: Option<f64> = other.get(Namespace::Chart, id, Some("1d:0")).await;
            assert_eq!(local, None);
            assert_eq!(remote, None);
        }
        let untouched: Option<f64> = cache.get(Namespace::Price, "a", None).await;
        assert_eq!(untouched, Some(1.0));
    }

    #[tokio::test]
    async fn test_invalidate_bulk_drops_both_tiers() {
        let shared = Arc::new(CountingShared::working());
        let cache = cache_with(shared.clone());
        let other = cache_with(shared.clone());

        let entries: Vec<(String, f64)> =
            vec![("a".into(), 1.0), ("b".into(), 2.0), ("c".into(), 3.0)];
        cache.set_bulk(Namespace::Price, &entries, None).await;

        let before = shared.calls();
        cache
            .invalidate_bulk(Namespace::Price, &["a".to_string(), "b".to_string()])
            .await;
        assert_eq!(shared.calls(), before + 1);

        for reader in [&cache, &other] {
            let a: Option<f64> = reader.get(Namespace::Price, "a", None).await;
            let b: Option<f64> = reader.get(Namespace::Price, "b", None).await;
            let c: Option<f64> = reader.get(Namespace::Price, "c", None).await;
            assert_eq!((a, b, c), (None, None, Some(3.0)));
        }
        assert_eq!(cache.stats().local.invalidations, 2);
    }

    #[tokio::test]
    async fn test_shared_failures_are_swallowed() {
        let shared = Arc::new(CountingShared::failing());
        let cache = cache_with(shared.clone());

        cache.set(Namespace::Price, "x", &3.5_f64, None, None).await;
        let value: Option<f64> = cache.get(Namespace::Price, "x", None).await;
        assert_eq!(value, Some(3.5));

        let missing: Option<f64> = cache.get(Namespace::Price, "y", None).await;
        assert_eq!(missing, None);

        cache.invalidate_by_prefix(Namespace::Price, None).await;
        cache.clear_all(CacheLevel::All).await;

        assert!(shared.calls() > 0);
        assert!(cache.stats().shared.errors >= 3);
    }

    #[tokio::test]
    async fn test_bulk_uses_one_shared_round_trip() {
        let shared = Arc::new(CountingShared::working());
        let writer = cache_with(shared.clone());
        let reader = cache_with(shared.clone());

        let entries: Vec<(String, f64)> = vec![("a".into(), 1.0), ("b".into(), 2.0)];
        let before = shared.calls();
        writer.set_bulk(Namespace::Price, &entries, None).await;
        assert_eq!(shared.calls(), before + 1);

        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let before = shared.calls();
        let found: FxHashMap<String, f64> = reader.get_bulk(Namespace::Price, &ids).await;
        assert_eq!(shared.calls(), before + 1);
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], 2.0);

        let stats = reader.stats();
        assert_eq!(stats.local.misses, 3);
        assert_eq!(stats.shared.hits, 2);
        assert_eq!(stats.shared.misses, 1);
    }

    #[tokio::test]
    async fn test_clear_all_local_keeps_shared() {
        let cache = cache_with(Arc::new(CountingShared::working()));
        cache.set(Namespace::User, "u1", &"prefs".to_string(), None, None).await;

        cache.clear_all(CacheLevel::Local).await;
        assert_eq!(cache.local_len(), 0);

        // still in the shared tier, so it comes back through a backfill
        let value: Option<String> = cache.get(Namespace::User, "u1", None).await;
        assert_eq!(value.as_deref(), Some("prefs"));

        cache.clear_all(CacheLevel::All).await;
        let gone: Option<String> = cache.get(Namespace::User, "u1", None).await;
        assert_eq!(gone, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_runs_at_most_once_per_interval() {
        let settings = CacheSettings {
            local_shards: 2,
            ..CacheSettings::default()
        };
        let cache = TieredCache::new(settings, Arc::new(CountingShared::working()));

        cache
            .set(Namespace::Price, "old", &1.0_f64, Some(Duration::from_secs(1)), None)
            .await;
        tokio::time::advance(Duration::from_secs(61)).await;

        cache.set(Namespace::Price, "new", &2.0_f64, None, None).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.local_len(), 1);

        // inside the interval no new sweep is scheduled
        cache
            .set(Namespace::Price, "short", &3.0_f64, Some(Duration::from_secs(1)), None)
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set(Namespace::Price, "other", &4.0_f64, None, None).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.local_len(), 3);
    }
}

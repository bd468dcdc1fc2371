use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use moka::{future::Cache, Expiry};

/// Shared key/value tier consumed by [`TieredCache`](super::TieredCache).
///
/// Implementations talk to an external cache (or, for a single process,
/// [`MemorySharedCache`]). Errors are returned here and swallowed by the
/// tiered cache, which degrades to local-only behaviour.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Multi-get; the result is index-aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Write many entries in a single round trip.
    async fn pipeline_set(&self, entries: Vec<(String, String, Duration)>) -> Result<()>;

    /// Keys matching a glob pattern where `*` matches any run of characters.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;
}

#[derive(Clone)]
struct SharedValue {
    payload: Arc<str>,
    ttl: Duration,
}

/// Per-entry TTL taken from the value itself.
struct PerEntryTtl;

impl Expiry<String, SharedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &SharedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &SharedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process shared tier backed by moka.
///
/// Used when no external cache is deployed, and by tests.
#[derive(Clone)]
pub struct MemorySharedCache {
    entries: Cache<String, SharedValue>,
}

impl MemorySharedCache {
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { entries }
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|v| v.payload.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .insert(
                key.to_string(),
                SharedValue {
                    payload: Arc::from(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.entries.get(key).await.map(|v| v.payload.to_string()));
        }
        Ok(values)
    }

    async fn pipeline_set(&self, entries: Vec<(String, String, Duration)>) -> Result<()> {
        for (key, value, ttl) in entries {
            self.entries
                .insert(
                    key,
                    SharedValue {
                        payload: Arc::from(value),
                        ttl,
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.to_string())
            .collect())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if self.entries.remove(key).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Glob match supporting only `*` (any run of characters, possibly empty).
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    if !key.starts_with(first) {
        return false;
    }

    let mut rest = &key[first.len()..];
    let mut segments: Vec<&str> = parts.collect();
    let Some(last) = segments.pop() else {
        // no '*' at all: exact match
        return rest.is_empty();
    };

    for segment in segments {
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("price:*", "price:kkub"));
        assert!(glob_match("price:*", "price:"));
        assert!(!glob_match("price:*", "metrics:kkub"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("chart:*:1d:*", "chart:0xabc:1d:100"));
        assert!(!glob_match("chart:*:1d:*", "chart:0xabc:1w:100"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("a*c", "abc"));
        assert!(!glob_match("ab*bc", "abc"));
    }

    #[tokio::test]
    async fn test_memory_shared_cache_roundtrip() {
        let cache = MemorySharedCache::new(100);
        let ttl = Duration::from_secs(60);

        cache.set("price:a", "1.0".into(), ttl).await.unwrap();
        cache
            .pipeline_set(vec![
                ("price:b".into(), "2.0".into(), ttl),
                ("metrics:protocol".into(), "{}".into(), ttl),
            ])
            .await
            .unwrap();

        assert_eq!(cache.get("price:a").await.unwrap().as_deref(), Some("1.0"));

        let values = cache
            .mget(&["price:b".into(), "price:missing".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("2.0".to_string()), None]);

        let mut keys = cache.scan("price:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["price:a".to_string(), "price:b".to_string()]);

        assert_eq!(cache.del(&keys).await.unwrap(), 2);
        assert_eq!(cache.get("price:a").await.unwrap(), None);
    }
}

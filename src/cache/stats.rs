use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl TierCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set(&self, count: u64) {
        self.sets.fetch_add(count, Ordering::Relaxed);
    }

    pub fn invalidated(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Swap every counter to zero and return what was there.
    fn take(&self) -> TierStats {
        TierStats {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            sets: self.sets.swap(0, Ordering::Relaxed),
            invalidations: self.invalidations.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
        }
    }
}

/// Lock-free hit/miss/set/invalidation counters per tier.
///
/// Reads and resets are safe while cache operations run concurrently; a
/// snapshot is not atomic across counters, which is fine for observability.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub local: TierCounters,
    pub shared: TierCounters,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            local: self.local.snapshot(),
            shared: self.shared.snapshot(),
        }
    }

    pub fn reset(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            local: self.local.take(),
            shared: self.shared.take(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub local: TierStats,
    pub shared: TierStats,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups answered by either tier.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local.hits + self.shared.hits;
        // every lookup records exactly one local hit or miss
        let lookups = self.local.hits + self.local.misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }
}

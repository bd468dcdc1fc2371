//! Two-tier cache: a sharded process-local map in front of a shared
//! key/value store.
//!
//! Keys are laid out as `namespace:id[:sub_key]`; see [`Namespace`].

mod local;
mod namespace;
mod shared;
mod stats;
mod tiered;

pub use local::LocalCache;
pub use namespace::{CacheLevel, Namespace};
pub use shared::{MemorySharedCache, SharedCache};
pub use stats::{CacheStats, CacheStatsSnapshot, TierStats};
pub use tiered::TieredCache;

#[cfg(test)]
pub(crate) use tiered::tests::CountingShared;

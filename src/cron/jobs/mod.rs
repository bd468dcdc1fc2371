pub mod cache_stats;
pub mod refresh_metrics;
pub mod token_snapshots;

//! Job logging tiered cache counters.

use log::info;

use crate::engine::PriceEngine;

pub fn run(engine: &PriceEngine) {
    let stats = engine.cache_stats();
    info!(
        "Cache hit rate {:.1}% | local: {} hits, {} misses, {} sets | shared: {} hits, {} misses, {} sets, {} errors",
        stats.hit_rate() * 100.0,
        stats.local.hits,
        stats.local.misses,
        stats.local.sets,
        stats.shared.hits,
        stats.shared.misses,
        stats.shared.sets,
        stats.shared.errors
    );
}

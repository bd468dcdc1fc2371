//! Job recomputing every pair, token and protocol metric.
//!
//! Cached metrics are overwritten, so reads between two runs are served
//! from cache while they stay fresh.

use anyhow::Result;
use log::info;

use crate::engine::PriceEngine;

pub async fn run(engine: &PriceEngine) -> Result<()> {
    info!("Starting refresh_metrics job...");

    let report = engine.refresh_metrics().await?;

    info!(
        "Protocol TVL ${:.2}, 24h volume ${:.2} across {} pairs",
        report.protocol.tvl_usd, report.protocol.volume.h24, report.protocol.pair_count
    );
    Ok(())
}

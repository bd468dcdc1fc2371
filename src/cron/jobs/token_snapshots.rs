//! Job to take token price snapshots for charts.
//!
//! Resolves every token's USD price in one bulk call and appends a
//! `price_usd` metric snapshot per priced token.

use anyhow::{Context, Result};
use log::info;

use crate::db::models::{MetricSnapshot, SnapshotEntity, METRIC_PRICE_USD};
use crate::engine::PriceEngine;

pub async fn run(engine: &PriceEngine) -> Result<()> {
    info!("Starting token_snapshots job...");

    let start = std::time::Instant::now();
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let repo = engine.repository();

    let token_ids: Vec<String> = repo
        .list_tokens()
        .await
        .context("listing tokens")?
        .into_iter()
        .map(|t| t.id)
        .collect();

    if token_ids.is_empty() {
        info!("No tokens to snapshot");
        return Ok(());
    }

    let prices = engine.get_usd_prices_bulk(&token_ids).await?;

    // Unpriced tokens would show up as zero dips on charts
    let mut snapshots: Vec<MetricSnapshot> = prices
        .iter()
        .filter(|(_, price)| **price > 0.0)
        .map(|(id, price)| {
            MetricSnapshot::new(SnapshotEntity::Token, id, METRIC_PRICE_USD, now, *price)
        })
        .collect();
    snapshots.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    if snapshots.is_empty() {
        info!("No priced tokens among {} to snapshot", token_ids.len());
        return Ok(());
    }

    repo.insert_metric_snapshots(&snapshots)
        .await
        .context("inserting token price snapshots")?;

    info!(
        "Inserted {} token snapshots ({} tokens unpriced) in {:?}",
        snapshots.len(),
        token_ids.len() - snapshots.len(),
        start.elapsed()
    );
    Ok(())
}

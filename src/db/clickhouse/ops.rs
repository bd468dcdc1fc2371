use anyhow::Context;
use log::info;

use crate::db::clickhouse::ClickhouseClient;
use crate::db::models::{MetricSnapshot, PriceSnapshot, SnapshotEntity, Swap};

impl ClickhouseClient {
    // ==================== SWAPS ====================

    pub async fn find_swaps_by_pair(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<Swap>> {
        self.client
            .query(
                "SELECT ?fields FROM swaps \
                 WHERE pair_id = ? AND timestamp >= ? \
                 ORDER BY timestamp",
            )
            .bind(pair_id)
            .bind(from_timestamp)
            .fetch_all::<Swap>()
            .await
            .with_context(|| format!("Failed to fetch swaps for pair {}", pair_id))
    }

    // ==================== SNAPSHOTS ====================

    pub async fn find_metric_snapshots(
        &self,
        entity: SnapshotEntity,
        entity_id: &str,
        metric_type: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<MetricSnapshot>> {
        self.client
            .query(
                "SELECT ?fields FROM metric_snapshots \
                 WHERE entity = ? AND entity_id = ? AND metric_type = ? AND timestamp >= ? \
                 ORDER BY timestamp",
            )
            .bind(entity.as_str())
            .bind(entity_id)
            .bind(metric_type)
            .bind(from_timestamp)
            .fetch_all::<MetricSnapshot>()
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch {} snapshots for {} {}",
                    metric_type,
                    entity.as_str(),
                    entity_id
                )
            })
    }

    pub async fn find_price_snapshots(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<PriceSnapshot>> {
        self.client
            .query(
                "SELECT ?fields FROM price_snapshots \
                 WHERE pair_id = ? AND timestamp >= ? \
                 ORDER BY timestamp",
            )
            .bind(pair_id)
            .bind(from_timestamp)
            .fetch_all::<PriceSnapshot>()
            .await
            .with_context(|| format!("Failed to fetch price snapshots for pair {}", pair_id))
    }

    pub async fn insert_metric_snapshots(&self, snapshots: &[MetricSnapshot]) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut inserter = self.client.inserter::<MetricSnapshot>("metric_snapshots");
        for snapshot in snapshots {
            inserter
                .write(snapshot)
                .await
                .context("Failed to write metric snapshot")?;
        }
        let stats = inserter.end().await.context("Failed to flush metric snapshots")?;

        info!("Committed {} metric snapshot rows", stats.rows);
        Ok(())
    }
}

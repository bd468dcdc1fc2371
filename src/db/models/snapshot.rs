use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// Entity kind a metric snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotEntity {
    Token,
    Pair,
    Protocol,
}

impl SnapshotEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotEntity::Token => "token",
            SnapshotEntity::Pair => "pair",
            SnapshotEntity::Protocol => "protocol",
        }
    }
}

/// Metric type written by the token snapshot job and read by charts.
pub const METRIC_PRICE_USD: &str = "price_usd";

/// Timestamped observation of one metric (ClickHouse `metric_snapshots`).
///
/// Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct MetricSnapshot {
    pub entity: String,
    pub entity_id: String,
    pub metric_type: String,
    /// Unix seconds
    pub timestamp: i64,
    pub value: Option<f64>,
}

impl MetricSnapshot {
    pub fn new(
        entity: SnapshotEntity,
        entity_id: &str,
        metric_type: &str,
        timestamp: i64,
        value: f64,
    ) -> Self {
        Self {
            entity: entity.as_str().to_string(),
            entity_id: entity_id.to_string(),
            metric_type: metric_type.to_string(),
            timestamp,
            value: Some(value),
        }
    }
}

/// Pair exchange rate observation (ClickHouse `price_snapshots`): token1 per
/// token0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct PriceSnapshot {
    pub pair_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub price: Option<f64>,
}

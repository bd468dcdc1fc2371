use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// One executed swap (ClickHouse `swaps`). Immutable once written.
///
/// Amounts are raw integer strings; `value_usd` is filled by the indexer
/// when it could price the trade at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct Swap {
    pub id: String,
    pub pair_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub amount_in0: String,
    pub amount_in1: String,
    pub amount_out0: String,
    pub amount_out1: String,
    pub value_usd: Option<f64>,
}

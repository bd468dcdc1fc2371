use serde::{Deserialize, Serialize};

/// USD volume over the fixed rolling windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeWindows {
    pub h1: f64,
    pub h24: f64,
    pub d7: f64,
    pub d30: f64,
    /// The 24h window before the current one, for the change figure
    pub prev_h24: f64,
}

impl VolumeWindows {
    pub fn add(&mut self, other: &VolumeWindows) {
        self.h1 += other.h1;
        self.h24 += other.h24;
        self.d7 += other.d7;
        self.d30 += other.d30;
        self.prev_h24 += other.prev_h24;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairMetrics {
    pub pair_id: String,
    pub token0_price_usd: f64,
    pub token1_price_usd: f64,
    pub tvl_usd: f64,
    pub volume: VolumeWindows,
    /// Percent change of 24h volume against the previous 24h
    pub volume_change_24h: f64,
    pub pool_apr: f64,
    /// Unix seconds
    pub computed_at: i64,
}

impl PairMetrics {
    pub fn zeroed(pair_id: &str) -> Self {
        Self {
            pair_id: pair_id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub token_id: String,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub fdv_usd: f64,
    /// This token's side of the reserves across its active pairs
    pub tvl_usd: f64,
    /// Volume of every pair the token trades in
    pub volume: VolumeWindows,
    pub volume_change_24h: f64,
    pub pair_count: u64,
    pub computed_at: i64,
}

impl TokenMetrics {
    pub fn zeroed(token_id: &str) -> Self {
        Self {
            token_id: token_id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMetrics {
    pub tvl_usd: f64,
    pub volume: VolumeWindows,
    pub volume_change_24h: f64,
    pub pair_count: u64,
    pub token_count: u64,
    pub computed_at: i64,
}

/// Values carrying their own computation time.
pub(crate) trait Timestamped {
    fn computed_at(&self) -> i64;
}

impl Timestamped for PairMetrics {
    fn computed_at(&self) -> i64 {
        self.computed_at
    }
}

impl Timestamped for TokenMetrics {
    fn computed_at(&self) -> i64 {
        self.computed_at
    }
}

impl Timestamped for ProtocolMetrics {
    fn computed_at(&self) -> i64 {
        self.computed_at
    }
}

/// Entity whose metrics must be recomputed on next read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum DirtyEntity {
    Pair(String),
    Token(String),
    Protocol,
}

/// Result of the update-all sweep. Failed entities are present, zeroed.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub pairs: Vec<PairMetrics>,
    pub tokens: Vec<TokenMetrics>,
    pub protocol: ProtocolMetrics,
    pub failures: usize,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::is_active;

/// AMM pair with raw reserves and pre-aggregated stats (PostgreSQL `pairs`).
///
/// Reserves are raw integer strings in each token's smallest unit; they are
/// never parsed as floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub id: String,
    pub address: String,
    pub token0_id: String,
    pub token1_id: String,
    pub reserve0: String,
    pub reserve1: String,
    pub created_at: DateTime<Utc>,

    // Pre-aggregated rolling windows
    pub volume_1h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub volume_7d: Option<f64>,
    pub volume_30d: Option<f64>,

    pub tvl_usd: Option<f64>,
    pub pool_apr: Option<f64>,
    /// LP fee in basis points, when the pair overrides the protocol default
    pub fee_bps: Option<i32>,
}

impl Pair {
    pub fn new(
        id: &str,
        address: &str,
        token0_id: &str,
        token1_id: &str,
        reserve0: &str,
        reserve1: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_lowercase(),
            token0_id: token0_id.to_string(),
            token1_id: token1_id.to_string(),
            reserve0: reserve0.to_string(),
            reserve1: reserve1.to_string(),
            created_at,
            volume_1h: None,
            volume_24h: None,
            volume_7d: None,
            volume_30d: None,
            tvl_usd: None,
            pool_apr: None,
            fee_bps: None,
        }
    }

    /// Both reserves positive.
    pub fn is_active(&self) -> bool {
        is_active(&self.reserve0, &self.reserve1)
    }

    pub fn contains(&self, token_id: &str) -> bool {
        self.token0_id == token_id || self.token1_id == token_id
    }

    /// The other side of the pair, or `None` if `token_id` is not in it.
    pub fn counterpart_of(&self, token_id: &str) -> Option<&str> {
        if self.token0_id == token_id {
            Some(&self.token1_id)
        } else if self.token1_id == token_id {
            Some(&self.token0_id)
        } else {
            None
        }
    }

    /// `(own reserve, counterpart reserve)` from `token_id`'s point of view.
    pub fn reserves_for(&self, token_id: &str) -> Option<(&str, &str)> {
        if self.token0_id == token_id {
            Some((&self.reserve0, &self.reserve1))
        } else if self.token1_id == token_id {
            Some((&self.reserve1, &self.reserve0))
        } else {
            None
        }
    }

    /// Fee as a fraction, falling back to `default_rate`.
    pub fn fee_rate(&self, default_rate: f64) -> f64 {
        match self.fee_bps {
            Some(bps) if bps > 0 => bps as f64 / 10_000.0,
            _ => default_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(r0: &str, r1: &str) -> Pair {
        Pair::new("p", "0xABC", "kkub", "usdt", r0, r1, Utc::now())
    }

    #[test]
    fn test_orientation_helpers() {
        let p = pair("500", "1000");
        assert_eq!(p.address, "0xabc");
        assert_eq!(p.counterpart_of("kkub"), Some("usdt"));
        assert_eq!(p.counterpart_of("usdt"), Some("kkub"));
        assert_eq!(p.counterpart_of("dai"), None);
        assert_eq!(p.reserves_for("usdt"), Some(("1000", "500")));
    }

    #[test]
    fn test_zero_reserve_is_inactive() {
        assert!(pair("1", "1").is_active());
        assert!(!pair("0", "1000").is_active());
        assert!(!pair("garbage", "1000").is_active());
    }

    #[test]
    fn test_fee_rate_override() {
        let mut p = pair("1", "1");
        assert_eq!(p.fee_rate(0.003), 0.003);
        p.fee_bps = Some(25);
        assert!((p.fee_rate(0.003) - 0.0025).abs() < 1e-12);
    }
}

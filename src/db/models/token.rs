use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token metadata and last known USD price (PostgreSQL `tokens`).
///
/// `price_usd` is the only field the engine writes, as a side effect of a
/// successful price derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,

    pub price_usd: Option<f64>,
    pub last_price_update: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(id: &str, address: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            id: id.to_string(),
            // Always lowercase addresses for consistent comparisons
            address: address.to_lowercase(),
            symbol: symbol.to_string(),
            decimals,
            price_usd: None,
            last_price_update: None,
        }
    }

    /// Stored price, if it is usable as an answer.
    pub fn persisted_price(&self) -> Option<f64> {
        self.price_usd.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Supply figures in whole tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSupply {
    pub total: Option<f64>,
    pub circulating: Option<f64>,
}

use std::fmt;

/// One step of the price fallback chain, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// `price` namespace of the tiered cache
    Cache,
    /// The token row's stored `price_usd`
    Persisted,
    /// Reserves against the most liquid stablecoin pair
    StablecoinPair,
    /// Reserves against a non-stable counterpart priced recursively
    CrossToken,
    /// On-chain TWAP, falling back to the same pair's reserves
    Oracle,
}

impl PriceSource {
    /// The full chain.
    pub const CHAIN: [PriceSource; 5] = [
        PriceSource::Cache,
        PriceSource::Persisted,
        PriceSource::StablecoinPair,
        PriceSource::CrossToken,
        PriceSource::Oracle,
    ];

    /// Steps that compute a new price rather than read a stored one.
    pub const DERIVED: [PriceSource; 3] = [
        PriceSource::StablecoinPair,
        PriceSource::CrossToken,
        PriceSource::Oracle,
    ];

    /// Derived prices are written back to the cache and the token row.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            PriceSource::StablecoinPair | PriceSource::CrossToken | PriceSource::Oracle
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Cache => "cache",
            PriceSource::Persisted => "persisted",
            PriceSource::StablecoinPair => "stablecoin pair",
            PriceSource::CrossToken => "cross token",
            PriceSource::Oracle => "oracle",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

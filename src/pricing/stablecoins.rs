use rustc_hash::FxHashSet;

use crate::config::PricingSettings;
use crate::db::models::Token;

/// Symbols treated as USD stablecoins on every deployment.
const DEFAULT_STABLECOIN_SYMBOLS: &[&str] = &[
    "USDT", "USDC", "DAI", "BUSD", "KUSDT", "KUSDC", "TUSD", "USDP", "FRAX",
];

/// Static set of tokens known to track USD, matched by symbol or address.
#[derive(Debug, Clone)]
pub struct StablecoinSet {
    symbols: FxHashSet<String>,
    addresses: FxHashSet<String>,
}

impl StablecoinSet {
    pub fn new(settings: &PricingSettings) -> Self {
        let symbols = DEFAULT_STABLECOIN_SYMBOLS
            .iter()
            .map(|s| s.to_string())
            .chain(settings.stablecoin_symbols.iter().map(|s| s.to_uppercase()))
            .collect();

        let addresses = settings
            .stablecoin_addresses
            .iter()
            .map(|a| a.to_lowercase())
            .collect();

        Self { symbols, addresses }
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.symbols.contains(&token.symbol.to_uppercase())
            || self.addresses.contains(&token.address)
    }
}

impl Default for StablecoinSet {
    fn default() -> Self {
        Self::new(&PricingSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_symbol_case_insensitively_and_configured_address() {
        let settings = PricingSettings {
            stablecoin_addresses: vec!["0xAbCd".to_string()],
            stablecoin_symbols: vec!["thb".to_string()],
            ..PricingSettings::default()
        };
        let set = StablecoinSet::new(&settings);

        assert!(set.contains(&Token::new("1", "0x01", "usdt", 6)));
        assert!(set.contains(&Token::new("2", "0x02", "THB", 18)));
        assert!(set.contains(&Token::new("3", "0xABCD", "WEIRD", 18)));
        assert!(!set.contains(&Token::new("4", "0x04", "KKUB", 18)));
    }
}

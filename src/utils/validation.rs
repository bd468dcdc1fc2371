//! Price validation constants and helper functions.
//!
//! Two bands are applied to every derived USD price:
//!
//! 1. STABLECOINS: a stablecoin's market price may drift, but a value outside
//!    0.5..=1.5 means the pair is broken or the route is wrong.
//!
//! 2. EVERYTHING ELSE: anything at or below 1e-9 or at or above 1e9 USD is
//!    treated as a decimal/inversion error rather than a real price.

// ============================================
// Price Validation Constants
// ============================================

/// Lowest acceptable USD price for a stablecoin.
pub const MIN_STABLE_USD_PRICE: f64 = 0.5;

/// Highest acceptable USD price for a stablecoin.
pub const MAX_STABLE_USD_PRICE: f64 = 1.5;

/// Exclusive lower bound for a non-stablecoin USD price.
pub const MIN_TOKEN_USD_PRICE: f64 = 1e-9;

/// Exclusive upper bound for a non-stablecoin USD price.
pub const MAX_TOKEN_USD_PRICE: f64 = 1e9;

// ============================================
// Price Validation Helpers
// ============================================

/// Check a derived USD price against the band for its token class.
#[inline]
pub fn is_sane_usd_price(price: f64, is_stablecoin: bool) -> bool {
    if !price.is_finite() {
        return false;
    }
    if is_stablecoin {
        (MIN_STABLE_USD_PRICE..=MAX_STABLE_USD_PRICE).contains(&price)
    } else {
        price > MIN_TOKEN_USD_PRICE && price < MAX_TOKEN_USD_PRICE
    }
}

/// Clamp a value that must be a non-negative finite number to `0.0`
/// when it is not. Used on every metric before it leaves the engine.
#[inline]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

/// Percentage change from `previous` to `current`, defined as 0 when there
/// is no previous value to compare against.
#[inline]
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stablecoin_band() {
        assert!(is_sane_usd_price(1.0, true));
        assert!(is_sane_usd_price(0.5, true));
        assert!(is_sane_usd_price(1.5, true));
        assert!(!is_sane_usd_price(3.0, true));
        assert!(!is_sane_usd_price(0.49, true));
    }

    #[test]
    fn test_token_band() {
        assert!(is_sane_usd_price(3.0, false));
        assert!(is_sane_usd_price(1e-8, false));
        assert!(!is_sane_usd_price(1e-9, false));
        assert!(!is_sane_usd_price(1e9, false));
        assert!(!is_sane_usd_price(f64::NAN, false));
        assert!(!is_sane_usd_price(-1.0, false));
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(150.0, 100.0), 50.0);
        assert_eq!(percent_change(50.0, 100.0), -50.0);
        assert_eq!(percent_change(50.0, 0.0), 0.0);
    }

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(-3.0), 0.0);
        assert_eq!(finite_or_zero(12.5), 12.5);
    }
}

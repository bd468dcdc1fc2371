//! Pure metric formulas.

use crate::db::models::{Swap, TokenSupply};
use crate::utils::{finite_or_zero, str_to_f64_with_decimals};

use super::types::VolumeWindows;

pub(crate) const HOUR: i64 = 3_600;
pub(crate) const DAY: i64 = 24 * HOUR;

/// Placeholder supply used when a token reports none at all.
const PLACEHOLDER_SUPPLY: f64 = 1_000_000.0;
/// Share of total supply assumed circulating when only the total is known.
const CIRCULATING_SHARE: f64 = 0.7;
/// FDV multiple over market cap when the total supply is unknown.
const FDV_OVER_MARKET_CAP: f64 = 1.5;

/// Oldest swap timestamp any window needs.
pub(crate) fn swap_lookback(now: i64) -> i64 {
    now - 30 * DAY
}

/// USD value of one swap: the indexer's `value_usd`, else input amounts at
/// current prices.
pub(crate) fn swap_value_usd(
    swap: &Swap,
    decimals0: u8,
    decimals1: u8,
    price0: f64,
    price1: f64,
) -> f64 {
    if let Some(value) = swap.value_usd.filter(|v| v.is_finite() && *v >= 0.0) {
        return value;
    }

    let amount0 = str_to_f64_with_decimals(&swap.amount_in0, decimals0).unwrap_or(0.0);
    let amount1 = str_to_f64_with_decimals(&swap.amount_in1, decimals1).unwrap_or(0.0);
    finite_or_zero(amount0 * price0 + amount1 * price1)
}

/// Bucket `(timestamp, usd)` observations into the rolling windows ending
/// at `now`.
pub(crate) fn volume_windows(values: &[(i64, f64)], now: i64) -> VolumeWindows {
    let mut windows = VolumeWindows::default();

    for &(timestamp, usd) in values {
        let age = now - timestamp;
        if age < 0 || age > 30 * DAY {
            continue;
        }
        if age <= HOUR {
            windows.h1 += usd;
        }
        if age <= DAY {
            windows.h24 += usd;
        } else if age <= 2 * DAY {
            windows.prev_h24 += usd;
        }
        if age <= 7 * DAY {
            windows.d7 += usd;
        }
        windows.d30 += usd;
    }

    windows
}

/// Annualized fee yield in percent; 0 without liquidity.
pub(crate) fn pool_apr(volume_24h: f64, fee_rate: f64, tvl_usd: f64) -> f64 {
    if tvl_usd <= 0.0 {
        return 0.0;
    }
    finite_or_zero(volume_24h * fee_rate / tvl_usd * 365.0 * 100.0)
}

/// `(market cap, FDV)` with the supply fallbacks applied.
pub(crate) fn valuation(price: f64, supply: Option<TokenSupply>) -> (f64, f64) {
    let supply = supply.unwrap_or_default();
    let positive = |v: Option<f64>| v.filter(|v| v.is_finite() && *v > 0.0);

    let market_cap = match (positive(supply.circulating), positive(supply.total)) {
        (Some(circulating), _) => price * circulating,
        (None, Some(total)) => price * total * CIRCULATING_SHARE,
        (None, None) => price * PLACEHOLDER_SUPPLY,
    };

    let fdv = match positive(supply.total) {
        Some(total) => price * total,
        None => market_cap * FDV_OVER_MARKET_CAP,
    };

    (finite_or_zero(market_cap), finite_or_zero(fdv))
}

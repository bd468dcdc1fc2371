//! Fixed-point reserve math.
//!
//! Reserves are raw integers in each token's smallest unit. Every
//! intermediate value stays a `BigInt`/`BigDecimal`; the conversion to
//! `f64` happens once, on the final ratio.

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use super::conversion::parse_raw_amount;
use crate::error::ReserveError;

/// Exact decimal value of a raw amount: `raw / 10^decimals`.
///
/// Only the scale changes, the digits are kept, so this is lossless for
/// any magnitude.
pub fn to_decimal(raw: &BigInt, decimals: u8) -> BigDecimal {
    BigDecimal::new(raw.clone(), decimals as i64)
}

/// Decimal value of a raw amount given as a string.
pub fn str_to_decimal(raw: &str, decimals: u8) -> Result<BigDecimal, ReserveError> {
    Ok(to_decimal(&parse_raw_amount(raw)?, decimals))
}

/// Price of one whole token A expressed in token B:
/// `(reserve_b / 10^decimals_b) / (reserve_a / 10^decimals_a)`.
///
/// Returns `ReserveError::ZeroReserve` when either side is empty, since a
/// pair without liquidity on both sides has no meaningful price.
pub fn price(
    reserve_a: &str,
    decimals_a: u8,
    reserve_b: &str,
    decimals_b: u8,
) -> Result<f64, ReserveError> {
    let raw_a = parse_raw_amount(reserve_a)?;
    let raw_b = parse_raw_amount(reserve_b)?;
    price_from_raw(&raw_a, decimals_a, &raw_b, decimals_b)
}

/// Same as [`price`], for already parsed reserves.
pub fn price_from_raw(
    raw_a: &BigInt,
    decimals_a: u8,
    raw_b: &BigInt,
    decimals_b: u8,
) -> Result<f64, ReserveError> {
    if raw_a.is_zero() || raw_b.is_zero() {
        return Err(ReserveError::ZeroReserve);
    }
    if raw_a.sign() == Sign::Minus || raw_b.sign() == Sign::Minus {
        return Err(ReserveError::Malformed("negative reserve".to_string()));
    }

    let amount_a = to_decimal(raw_a, decimals_a);
    let amount_b = to_decimal(raw_b, decimals_b);

    let ratio = amount_b / amount_a;
    match ratio.to_f64() {
        Some(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(ReserveError::NotRepresentable),
    }
}

/// A pair is usable for pricing only while both reserves are positive.
pub fn is_active(reserve0: &str, reserve1: &str) -> bool {
    matches!(
        (parse_raw_amount(reserve0), parse_raw_amount(reserve1)),
        (Ok(r0), Ok(r1)) if !r0.is_zero() && !r1.is_zero()
    )
}

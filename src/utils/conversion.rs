//! Type conversion utilities.
//!
//! Raw on-chain amounts arrive as decimal integer strings of arbitrary size.
//! They are parsed into `BigInt` and only turned into `f64` at the very end,
//! after decimal adjustment, so 18-decimal tokens keep their precision.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::str::FromStr;

use super::reserve_math::to_decimal;
use crate::error::ReserveError;

// ============================================
// Raw Amount Parsing
// ============================================

/// Parse a raw integer amount (smallest token unit) from its string form.
///
/// Accepts only non-negative base-10 integers. Surrounding whitespace is
/// tolerated, anything else (signs, decimal points, exponents) is rejected.
pub fn parse_raw_amount(raw: &str) -> Result<BigInt, ReserveError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReserveError::Malformed(raw.to_string()));
    }

    BigInt::from_str(trimmed).map_err(|_| ReserveError::Malformed(raw.to_string()))
}

/// Parse a raw amount and adjust it by `decimals`, returning `None` when the
/// string is malformed or the result does not fit a finite f64.
///
/// # Example
/// ```ignore
/// let adjusted = str_to_f64_with_decimals("1500000", 6); // Some(1.5)
/// ```
pub fn str_to_f64_with_decimals(value_str: &str, decimals: u8) -> Option<f64> {
    let raw = parse_raw_amount(value_str).ok()?;
    let result = to_decimal(&raw, decimals).to_f64()?;

    if result.is_finite() && result >= 0.0 {
        Some(result)
    } else {
        None
    }
}

/// Raw amount representing exactly one whole token (`10^decimals`).
pub fn one_whole_token(decimals: u8) -> BigInt {
    BigInt::from(10u32).pow(decimals as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_amount_rejects_non_integers() {
        assert!(parse_raw_amount("1000").is_ok());
        assert!(parse_raw_amount(" 42 ").is_ok());
        assert_eq!(
            parse_raw_amount("-5"),
            Err(ReserveError::Malformed("-5".to_string()))
        );
        assert!(parse_raw_amount("1.5").is_err());
        assert!(parse_raw_amount("1e18").is_err());
        assert!(parse_raw_amount("").is_err());
    }

    #[test]
    fn test_str_to_f64_with_decimals() {
        assert_eq!(str_to_f64_with_decimals("1500000", 6), Some(1.5));
        assert_eq!(str_to_f64_with_decimals("0", 18), Some(0.0));
        assert_eq!(str_to_f64_with_decimals("abc", 18), None);
    }

    #[test]
    fn test_one_whole_token_matches_pow10() {
        assert_eq!(one_whole_token(0), BigInt::from(1));
        assert_eq!(one_whole_token(6), BigInt::from(1_000_000));
        assert_eq!(one_whole_token(18).to_string(), "1000000000000000000");
    }
}

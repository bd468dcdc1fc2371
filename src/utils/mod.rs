//! Utility functions for the valuer engine.
//!
//! - [`conversion`] - Raw amount parsing and f64 conversion
//! - [`reserve_math`] - Fixed-point reserve to price math
//! - [`validation`] - Sanity bands and metric helpers

mod conversion;
pub mod reserve_math;
mod validation;

// ============================================
// Re-exports
// ============================================

// Conversion utilities
pub use conversion::{one_whole_token, parse_raw_amount, str_to_f64_with_decimals};

// Reserve math
pub use reserve_math::{is_active, price_from_raw, str_to_decimal, to_decimal};

// Validation utilities
pub use validation::{
    finite_or_zero, is_sane_usd_price, percent_change, MAX_STABLE_USD_PRICE,
    MAX_TOKEN_USD_PRICE, MIN_STABLE_USD_PRICE, MIN_TOKEN_USD_PRICE,
};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

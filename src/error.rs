//! Typed errors surfaced by the pricing engine.
//!
//! Infrastructure code (storage adapters, jobs, the binary) uses `anyhow`.
//! The variants here are the ones a caller can act on: contract violations
//! on the produced interface and reserve arithmetic rejections.

use thiserror::Error;

/// Contract violations on the public engine interface.
///
/// Data-quality problems (missing tokens, zero reserves, insane prices) never
/// show up here: those resolve to `0` / zeroed metrics / an empty series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid token id: {0:?}")]
    InvalidTokenId(String),
    #[error("invalid pair id: {0:?}")]
    InvalidPairId(String),
    #[error("invalid token address: {0:?}")]
    InvalidAddress(String),
    #[error("unknown timeframe: {0:?} (expected one of 1h, 1d, 1w, 1m, 1y)")]
    UnknownTimeframe(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Rejections from fixed-point reserve math.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReserveError {
    #[error("reserve is zero")]
    ZeroReserve,
    #[error("malformed raw amount: {0:?}")]
    Malformed(String),
    #[error("result is not representable as a finite f64")]
    NotRepresentable,
}

/// Failures of the on-chain TWAP oracle.
///
/// The first four mirror the contract's custom errors that still leave the
/// pair's reserves usable as a price source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle pair is not initialized")]
    NotInitialized,
    #[error("oracle price is stale")]
    StalePrice,
    #[error("oracle period is invalid")]
    InvalidPeriod,
    #[error("oracle has insufficient observations")]
    InsufficientData,
    #[error("oracle rejected the pair")]
    InvalidPair,
    #[error("oracle rejected the token")]
    InvalidToken,
    #[error("oracle call timed out")]
    Timeout,
    #[error("oracle transport error: {0}")]
    Transport(String),
}

impl OracleError {
    /// Whether the caller should price the same pair from its reserves.
    pub fn falls_back_to_reserves(&self) -> bool {
        matches!(
            self,
            OracleError::NotInitialized
                | OracleError::StalePrice
                | OracleError::InvalidPeriod
                | OracleError::InsufficientData
        )
    }
}

/// Ids are used verbatim inside cache keys (`namespace:id[:sub]`), so the
/// separator and glob characters are rejected along with blank input.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty()
        && id.len() <= 256
        && !id.chars().any(|c| c == ':' || c == '*' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("kkub"));
        assert!(is_valid_id("0x67ebd850304c70d983b2d1b93ea79c7cd6c3f6b5"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("   "));
        assert!(!is_valid_id("price:kkub"));
        assert!(!is_valid_id("kk*"));
        assert!(!is_valid_id("kk ub"));
    }

    #[test]
    fn test_oracle_fallback_classification() {
        assert!(OracleError::StalePrice.falls_back_to_reserves());
        assert!(OracleError::InsufficientData.falls_back_to_reserves());
        assert!(!OracleError::InvalidPair.falls_back_to_reserves());
        assert!(!OracleError::Timeout.falls_back_to_reserves());
    }
}

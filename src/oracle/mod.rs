//! On-chain TWAP oracle capability.

use async_trait::async_trait;
use num_bigint::BigInt;

use crate::error::OracleError;

mod twap;

pub use twap::TwapOracle;

/// Time-weighted price source keyed by pair address.
///
/// Implementations bound every call with their own timeout and report it as
/// [`OracleError::Timeout`].
#[async_trait]
pub trait Oracle: Send + Sync {
    /// TWAP window passed to [`Oracle::consult`], in seconds.
    fn period_secs(&self) -> u32;

    async fn is_pair_initialized(&self, pair_address: &str) -> Result<bool, OracleError>;

    /// Raw amount of the counterpart token received for `amount_in` raw
    /// units of `token_address`, averaged over `period` seconds.
    async fn consult(
        &self,
        pair_address: &str,
        token_address: &str,
        amount_in: &BigInt,
        period: u32,
    ) -> Result<BigInt, OracleError>;
}

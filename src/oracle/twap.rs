use std::str::FromStr;
use std::time::Duration;

use alloy::{
    primitives::{Address, U256},
    providers::{DynProvider, ProviderBuilder},
};
use anyhow::Context;
use async_trait::async_trait;
use log::info;
use num_bigint::{BigInt, Sign};
use url::Url;

use super::Oracle;
use crate::abis::oracle::ITwapOracle::{self, ITwapOracleErrors};
use crate::config::OracleSettings;
use crate::error::OracleError;

/// TWAP oracle contract client over JSON-RPC.
#[derive(Clone)]
pub struct TwapOracle {
    provider: DynProvider,
    address: Address,
    period_secs: u32,
    timeout: Duration,
}

impl TwapOracle {
    pub fn new(settings: &OracleSettings) -> anyhow::Result<Self> {
        let url = Url::parse(&settings.rpc_url).context("Invalid oracle RPC URL")?;
        let address = Address::from_str(&settings.address)
            .with_context(|| format!("Invalid oracle address {}", settings.address))?;

        let client = ProviderBuilder::new().connect_http(url);
        let provider = DynProvider::new(client);

        info!(
            "TWAP oracle at {} (period {}s, timeout {}ms)",
            address, settings.period_secs, settings.timeout_ms
        );

        Ok(Self {
            provider,
            address,
            period_secs: settings.period_secs,
            timeout: Duration::from_millis(settings.timeout_ms),
        })
    }

    fn contract(&self) -> ITwapOracle::ITwapOracleInstance<DynProvider> {
        ITwapOracle::new(self.address, self.provider.clone())
    }
}

/// Map a contract call failure to the oracle's typed errors.
fn classify(err: alloy::contract::Error) -> OracleError {
    match err.as_decoded_interface_error::<ITwapOracleErrors>() {
        Some(ITwapOracleErrors::NotInitialized(_)) => OracleError::NotInitialized,
        Some(ITwapOracleErrors::StalePrice(_)) => OracleError::StalePrice,
        Some(ITwapOracleErrors::InvalidPeriod(_)) => OracleError::InvalidPeriod,
        Some(ITwapOracleErrors::InsufficientData(_)) => OracleError::InsufficientData,
        Some(ITwapOracleErrors::InvalidPair(_)) => OracleError::InvalidPair,
        Some(ITwapOracleErrors::InvalidToken(_)) => OracleError::InvalidToken,
        None => OracleError::Transport(err.to_string()),
    }
}

fn u256_to_bigint(value: U256) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>())
}

fn bigint_to_u256(value: &BigInt) -> Option<U256> {
    let (sign, bytes) = value.to_bytes_be();
    if sign == Sign::Minus || bytes.len() > 32 {
        return None;
    }
    Some(U256::from_be_slice(&bytes))
}

#[async_trait]
impl Oracle for TwapOracle {
    fn period_secs(&self) -> u32 {
        self.period_secs
    }

    async fn is_pair_initialized(&self, pair_address: &str) -> Result<bool, OracleError> {
        let pair = Address::from_str(pair_address).map_err(|_| OracleError::InvalidPair)?;
        let contract = self.contract();

        tokio::time::timeout(self.timeout, contract.isPairInitialized(pair).call())
            .await
            .map_err(|_| OracleError::Timeout)?
            .map_err(classify)
    }

    async fn consult(
        &self,
        pair_address: &str,
        token_address: &str,
        amount_in: &BigInt,
        period: u32,
    ) -> Result<BigInt, OracleError> {
        let pair = Address::from_str(pair_address).map_err(|_| OracleError::InvalidPair)?;
        let token = Address::from_str(token_address).map_err(|_| OracleError::InvalidToken)?;
        let amount_in = bigint_to_u256(amount_in)
            .ok_or_else(|| OracleError::Transport("amount does not fit uint256".to_string()))?;
        let contract = self.contract();

        let amount_out = tokio::time::timeout(
            self.timeout,
            contract.consult(pair, token, amount_in, period).call(),
        )
        .await
        .map_err(|_| OracleError::Timeout)?
        .map_err(classify)?;

        Ok(u256_to_bigint(amount_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint256_conversions() {
        let one_ether = BigInt::from(10u64).pow(18);
        let as_u256 = bigint_to_u256(&one_ether).unwrap();
        assert_eq!(as_u256, U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(u256_to_bigint(as_u256), one_ether);

        assert!(bigint_to_u256(&BigInt::from(-1)).is_none());
        assert!(bigint_to_u256(&(BigInt::from(1) << 256)).is_none());
        assert_eq!(u256_to_bigint(U256::MAX), (BigInt::from(1) << 256) - 1);
    }

    #[test]
    fn test_new_rejects_bad_address() {
        let settings = OracleSettings {
            rpc_url: "http://localhost:8545".to_string(),
            address: "not-an-address".to_string(),
            period_secs: 3600,
            timeout_ms: 1000,
        };
        assert!(TwapOracle::new(&settings).is_err());
    }
}

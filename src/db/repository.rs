//! Query shapes the engine consumes from storage.
//!
//! Each trait is one table family; [`Repository`] bundles them so that
//! components can hold a single `Arc<dyn Repository>`.

use async_trait::async_trait;

use super::models::{MetricSnapshot, Pair, PriceSnapshot, SnapshotEntity, Swap, Token, TokenSupply};

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get_token(&self, id: &str) -> anyhow::Result<Option<Token>>;

    async fn get_token_by_address(&self, address: &str) -> anyhow::Result<Option<Token>>;

    /// Batched lookup; unknown ids are simply absent.
    async fn get_tokens(&self, ids: &[String]) -> anyhow::Result<Vec<Token>>;

    /// Persist a derived price and stamp `last_price_update`.
    async fn update_token_price(&self, id: &str, price_usd: f64) -> anyhow::Result<()>;

    async fn get_token_supply(&self, id: &str) -> anyhow::Result<Option<TokenSupply>>;

    async fn list_tokens(&self) -> anyhow::Result<Vec<Token>>;
}

#[async_trait]
pub trait PairRepository: Send + Sync {
    async fn get_pair(&self, id: &str) -> anyhow::Result<Option<Pair>>;

    /// Every pair where the token is token0 or token1.
    async fn find_pairs_by_token(&self, token_id: &str) -> anyhow::Result<Vec<Pair>>;

    async fn list_pairs(&self) -> anyhow::Result<Vec<Pair>>;
}

#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// Swaps of a pair at or after `from_timestamp` (unix seconds).
    async fn find_swaps_by_pair(&self, pair_id: &str, from_timestamp: i64)
        -> anyhow::Result<Vec<Swap>>;
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Metric observations at or after `from_timestamp`, ordered by timestamp.
    async fn find_metric_snapshots(
        &self,
        entity: SnapshotEntity,
        entity_id: &str,
        metric_type: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<MetricSnapshot>>;

    /// Pair exchange rates at or after `from_timestamp`, ordered by timestamp.
    async fn find_price_snapshots(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<PriceSnapshot>>;

    async fn insert_metric_snapshots(&self, snapshots: &[MetricSnapshot]) -> anyhow::Result<()>;
}

/// All storage capabilities the engine needs.
pub trait Repository:
    TokenRepository + PairRepository + SwapRepository + SnapshotRepository
{
}

impl<T> Repository for T where
    T: TokenRepository + PairRepository + SwapRepository + SnapshotRepository
{
}

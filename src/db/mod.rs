use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::config::Settings;

pub mod clickhouse;
#[cfg(test)]
pub(crate) mod memory;
pub mod models;
pub mod postgres;
mod repository;

pub use clickhouse::ClickhouseClient;
pub use postgres::PostgresClient;
pub use repository::{
    PairRepository, Repository, SnapshotRepository, SwapRepository, TokenRepository,
};

use models::{MetricSnapshot, Pair, PriceSnapshot, SnapshotEntity, Swap, Token, TokenSupply};

/// Combined database client managing ClickHouse and PostgreSQL connections.
///
/// PostgreSQL holds the relational state (tokens, pairs).
/// ClickHouse holds the append-only series (swaps, snapshots).
#[derive(Clone)]
pub struct Database {
    pub clickhouse: Arc<ClickhouseClient>,
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let clickhouse = ClickhouseClient::new(settings.clickhouse.clone()).await?;
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;

        // Run migrations
        clickhouse.migrate().await?;
        postgres.migrate().await?;

        Ok(Self {
            clickhouse: Arc::new(clickhouse),
            postgres: Arc::new(postgres),
        })
    }
}

/// Run a repository call under `timeout`.
///
/// Errors and timeouts are logged and flattened to `None`: the caller
/// treats them as that step producing no answer.
pub async fn bounded_query<T, F>(timeout: Duration, what: &str, query: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Repository call {} failed: {:#}", what, e);
            None
        },
        Err(_) => {
            warn!("Repository call {} timed out after {:?}", what, timeout);
            None
        },
    }
}

#[async_trait]
impl TokenRepository for Database {
    async fn get_token(&self, id: &str) -> anyhow::Result<Option<Token>> {
        self.postgres.get_token(id).await
    }

    async fn get_token_by_address(&self, address: &str) -> anyhow::Result<Option<Token>> {
        self.postgres.get_token_by_address(address).await
    }

    async fn get_tokens(&self, ids: &[String]) -> anyhow::Result<Vec<Token>> {
        self.postgres.get_tokens(ids).await
    }

    async fn update_token_price(&self, id: &str, price_usd: f64) -> anyhow::Result<()> {
        self.postgres.update_token_price(id, price_usd).await
    }

    async fn get_token_supply(&self, id: &str) -> anyhow::Result<Option<TokenSupply>> {
        self.postgres.get_token_supply(id).await
    }

    async fn list_tokens(&self) -> anyhow::Result<Vec<Token>> {
        self.postgres.list_tokens().await
    }
}

#[async_trait]
impl PairRepository for Database {
    async fn get_pair(&self, id: &str) -> anyhow::Result<Option<Pair>> {
        self.postgres.get_pair(id).await
    }

    async fn find_pairs_by_token(&self, token_id: &str) -> anyhow::Result<Vec<Pair>> {
        self.postgres.find_pairs_by_token(token_id).await
    }

    async fn list_pairs(&self) -> anyhow::Result<Vec<Pair>> {
        self.postgres.list_pairs().await
    }
}

#[async_trait]
impl SwapRepository for Database {
    async fn find_swaps_by_pair(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<Swap>> {
        self.clickhouse
            .find_swaps_by_pair(pair_id, from_timestamp)
            .await
    }
}

#[async_trait]
impl SnapshotRepository for Database {
    async fn find_metric_snapshots(
        &self,
        entity: SnapshotEntity,
        entity_id: &str,
        metric_type: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<MetricSnapshot>> {
        self.clickhouse
            .find_metric_snapshots(entity, entity_id, metric_type, from_timestamp)
            .await
    }

    async fn find_price_snapshots(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<PriceSnapshot>> {
        self.clickhouse
            .find_price_snapshots(pair_id, from_timestamp)
            .await
    }

    async fn insert_metric_snapshots(&self, snapshots: &[MetricSnapshot]) -> anyhow::Result<()> {
        self.clickhouse.insert_metric_snapshots(snapshots).await
    }
}

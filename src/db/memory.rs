//! In-memory repository used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::models::{
    MetricSnapshot, Pair, PriceSnapshot, SnapshotEntity, Swap, Token, TokenSupply,
};
use super::repository::{PairRepository, SnapshotRepository, SwapRepository, TokenRepository};

#[derive(Default)]
pub(crate) struct MemoryRepository {
    tokens: RwLock<FxHashMap<String, Token>>,
    supplies: RwLock<FxHashMap<String, TokenSupply>>,
    pairs: RwLock<Vec<Pair>>,
    swaps: RwLock<Vec<Swap>>,
    metric_snapshots: RwLock<Vec<MetricSnapshot>>,
    price_snapshots: RwLock<Vec<PriceSnapshot>>,

    failing_tokens: RwLock<FxHashSet<String>>,
    pair_delay: RwLock<Option<Duration>>,

    pub pair_lookups: AtomicUsize,
    pub price_writes: RwLock<Vec<(String, f64)>>,
}

impl MemoryRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_token(&self, token: Token) {
        self.tokens.write().insert(token.id.clone(), token);
    }

    /// Shorthand for a token without a persisted price.
    pub(crate) fn token(&self, id: &str, symbol: &str, decimals: u8) {
        self.add_token(Token::new(id, &format!("0x{}", id), symbol, decimals));
    }

    pub(crate) fn add_pair(&self, pair: Pair) {
        self.pairs.write().push(pair);
    }

    /// Shorthand for a pair `token0/token1` with the given raw reserves.
    pub(crate) fn pair(&self, id: &str, token0: &str, token1: &str, reserve0: &str, reserve1: &str) {
        self.add_pair(Pair::new(
            id,
            &format!("0x{}", id),
            token0,
            token1,
            reserve0,
            reserve1,
            Utc::now(),
        ));
    }

    pub(crate) fn set_supply(&self, token_id: &str, supply: TokenSupply) {
        self.supplies.write().insert(token_id.to_string(), supply);
    }

    pub(crate) fn add_swap(&self, swap: Swap) {
        self.swaps.write().push(swap);
    }

    pub(crate) fn add_metric_snapshot(&self, snapshot: MetricSnapshot) {
        self.metric_snapshots.write().push(snapshot);
    }

    pub(crate) fn add_price_snapshot(&self, pair_id: &str, timestamp: i64, price: f64) {
        self.price_snapshots.write().push(PriceSnapshot {
            pair_id: pair_id.to_string(),
            timestamp,
            price: Some(price),
        });
    }

    /// Make every pair lookup for `token_id` fail.
    pub(crate) fn fail_pairs_for(&self, token_id: &str) {
        self.failing_tokens.write().insert(token_id.to_string());
    }

    pub(crate) fn delay_pair_lookups(&self, delay: Duration) {
        *self.pair_delay.write() = Some(delay);
    }

    pub(crate) fn stored_price(&self, token_id: &str) -> Option<f64> {
        self.tokens.read().get(token_id).and_then(|t| t.price_usd)
    }

    pub(crate) fn metric_snapshot_count(&self) -> usize {
        self.metric_snapshots.read().len()
    }
}

#[async_trait]
impl TokenRepository for MemoryRepository {
    async fn get_token(&self, id: &str) -> anyhow::Result<Option<Token>> {
        Ok(self.tokens.read().get(id).cloned())
    }

    async fn get_token_by_address(&self, address: &str) -> anyhow::Result<Option<Token>> {
        let address = address.to_lowercase();
        Ok(self
            .tokens
            .read()
            .values()
            .find(|t| t.address.to_lowercase() == address)
            .cloned())
    }

    async fn get_tokens(&self, ids: &[String]) -> anyhow::Result<Vec<Token>> {
        let tokens = self.tokens.read();
        Ok(ids.iter().filter_map(|id| tokens.get(id).cloned()).collect())
    }

    async fn update_token_price(&self, id: &str, price_usd: f64) -> anyhow::Result<()> {
        if let Some(token) = self.tokens.write().get_mut(id) {
            token.price_usd = Some(price_usd);
            token.last_price_update = Some(Utc::now());
        }
        self.price_writes.write().push((id.to_string(), price_usd));
        Ok(())
    }

    async fn get_token_supply(&self, id: &str) -> anyhow::Result<Option<TokenSupply>> {
        Ok(self.supplies.read().get(id).copied())
    }

    async fn list_tokens(&self) -> anyhow::Result<Vec<Token>> {
        let mut tokens: Vec<Token> = self.tokens.read().values().cloned().collect();
        tokens.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tokens)
    }
}

#[async_trait]
impl PairRepository for MemoryRepository {
    async fn get_pair(&self, id: &str) -> anyhow::Result<Option<Pair>> {
        Ok(self.pairs.read().iter().find(|p| p.id == id).cloned())
    }

    async fn find_pairs_by_token(&self, token_id: &str) -> anyhow::Result<Vec<Pair>> {
        self.pair_lookups.fetch_add(1, Ordering::SeqCst);

        let delay = *self.pair_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_tokens.read().contains(token_id) {
            return Err(anyhow!("pairs table unavailable"));
        }

        Ok(self
            .pairs
            .read()
            .iter()
            .filter(|p| p.contains(token_id))
            .cloned()
            .collect())
    }

    async fn list_pairs(&self) -> anyhow::Result<Vec<Pair>> {
        Ok(self.pairs.read().clone())
    }
}

#[async_trait]
impl SwapRepository for MemoryRepository {
    async fn find_swaps_by_pair(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<Swap>> {
        Ok(self
            .swaps
            .read()
            .iter()
            .filter(|s| s.pair_id == pair_id && s.timestamp >= from_timestamp)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SnapshotRepository for MemoryRepository {
    async fn find_metric_snapshots(
        &self,
        entity: SnapshotEntity,
        entity_id: &str,
        metric_type: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<MetricSnapshot>> {
        let mut rows: Vec<MetricSnapshot> = self
            .metric_snapshots
            .read()
            .iter()
            .filter(|s| {
                s.entity == entity.as_str()
                    && s.entity_id == entity_id
                    && s.metric_type == metric_type
                    && s.timestamp >= from_timestamp
            })
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }

    async fn find_price_snapshots(
        &self,
        pair_id: &str,
        from_timestamp: i64,
    ) -> anyhow::Result<Vec<PriceSnapshot>> {
        let mut rows: Vec<PriceSnapshot> = self
            .price_snapshots
            .read()
            .iter()
            .filter(|s| s.pair_id == pair_id && s.timestamp >= from_timestamp)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }

    async fn insert_metric_snapshots(&self, snapshots: &[MetricSnapshot]) -> anyhow::Result<()> {
        self.metric_snapshots
            .write()
            .extend(snapshots.iter().cloned());
        Ok(())
    }
}

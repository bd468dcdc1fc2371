use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use log::{error, info, warn};
use serde::{de::DeserializeOwned, Serialize};

use super::compute::{pool_apr, swap_lookback, swap_value_usd, valuation, volume_windows};
use super::types::{
    DirtyEntity, PairMetrics, ProtocolMetrics, SweepReport, Timestamped, TokenMetrics,
    VolumeWindows,
};
use crate::cache::{Namespace, TieredCache};
use crate::config::MetricsSettings;
use crate::db::{bounded_query, models::Pair, Repository};
use crate::error::{is_valid_id, EngineError, EngineResult};
use crate::pricing::PriceResolver;
use crate::utils::{finite_or_zero, percent_change, str_to_f64_with_decimals, unix_now};

const PROTOCOL_KEY: &str = "protocol";
const PAIR_KEY: &str = "pair";
const TOKEN_KEY: &str = "token";

/// Computes protocol, pair and token metrics and keeps them in the
/// `metrics` cache namespace.
///
/// Cached metrics are only served while their `computed_at` is younger
/// than the cache's medium TTL, whatever TTL the entry was stored with.
pub struct MetricsAggregator {
    cache: Arc<TieredCache>,
    repo: Arc<dyn Repository>,
    resolver: Arc<PriceResolver>,
    settings: MetricsSettings,
    repo_timeout: Duration,
}

impl MetricsAggregator {
    pub fn new(
        cache: Arc<TieredCache>,
        repo: Arc<dyn Repository>,
        resolver: Arc<PriceResolver>,
        settings: MetricsSettings,
        repo_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            repo,
            resolver,
            settings,
            repo_timeout,
        }
    }

    fn concurrency(&self) -> usize {
        self.settings.concurrency.max(1)
    }

    // ==================== PUBLIC INTERFACE ====================

    pub async fn get_protocol_metrics(&self, force: bool) -> ProtocolMetrics {
        match self
            .cached_or_compute(PROTOCOL_KEY, None, force, self.compute_protocol())
            .await
        {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Failed to compute protocol metrics: {:#}", e);
                ProtocolMetrics::default()
            },
        }
    }

    pub async fn get_pair_metrics(&self, pair_id: &str, force: bool) -> EngineResult<PairMetrics> {
        if !is_valid_id(pair_id) {
            return Err(EngineError::InvalidPairId(pair_id.to_string()));
        }

        Ok(self.pair_metrics(pair_id, force).await.unwrap_or_else(|e| {
            warn!("Failed to compute metrics of pair {}: {:#}", pair_id, e);
            PairMetrics::zeroed(pair_id)
        }))
    }

    pub async fn get_token_metrics(
        &self,
        token_id: &str,
        force: bool,
    ) -> EngineResult<TokenMetrics> {
        if !is_valid_id(token_id) {
            return Err(EngineError::InvalidTokenId(token_id.to_string()));
        }

        Ok(self.token_metrics(token_id, force).await.unwrap_or_else(|e| {
            warn!("Failed to compute metrics of token {}: {:#}", token_id, e);
            TokenMetrics::zeroed(token_id)
        }))
    }

    /// Drop the cached metrics of an entity. Protocol totals depend on every
    /// pair and token, so they are dropped as well.
    pub async fn mark_dirty(&self, entity: &DirtyEntity) {
        match entity {
            DirtyEntity::Pair(id) => {
                self.cache
                    .invalidate(Namespace::Metrics, PAIR_KEY, Some(id.as_str()))
                    .await;
            },
            DirtyEntity::Token(id) => {
                self.cache
                    .invalidate(Namespace::Metrics, TOKEN_KEY, Some(id.as_str()))
                    .await;
            },
            DirtyEntity::Protocol => {},
        }
        self.cache
            .invalidate(Namespace::Metrics, PROTOCOL_KEY, None)
            .await;
    }

    /// Recompute every pair, then every token, then the protocol totals.
    ///
    /// A failing entity is logged and reported zeroed; the sweep goes on.
    pub async fn refresh_all(&self) -> anyhow::Result<SweepReport> {
        let start = Instant::now();

        let pairs = self.query("list pairs", self.repo.list_pairs()).await?;
        let tokens = self.query("list tokens", self.repo.list_tokens()).await?;
        let mut report = SweepReport::default();

        let pair_jobs: Vec<BoxFuture<'_, (String, anyhow::Result<PairMetrics>)>> = pairs
            .iter()
            .map(|pair| {
                async move { (pair.id.clone(), self.pair_metrics_of(pair, true).await) }.boxed()
            })
            .collect();
        let pair_results: Vec<(String, anyhow::Result<PairMetrics>)> = stream::iter(pair_jobs)
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        for (pair_id, result) in pair_results {
            let metrics = match result {
                Ok(metrics) => metrics,
                Err(e) => {
                    error!("Failed to refresh metrics of pair {}: {:#}", pair_id, e);
                    report.failures += 1;
                    PairMetrics::zeroed(&pair_id)
                },
            };
            report.pairs.push(metrics);
        }

        let token_jobs: Vec<BoxFuture<'_, (String, anyhow::Result<TokenMetrics>)>> = tokens
            .iter()
            .map(|token| {
                async move { (token.id.clone(), self.token_metrics(&token.id, true).await) }
                    .boxed()
            })
            .collect();
        let token_results: Vec<(String, anyhow::Result<TokenMetrics>)> =
            stream::iter(token_jobs)
                .buffer_unordered(self.concurrency())
                .collect()
                .await;

        for (token_id, result) in token_results {
            let metrics = match result {
                Ok(metrics) => metrics,
                Err(e) => {
                    error!("Failed to refresh metrics of token {}: {:#}", token_id, e);
                    report.failures += 1;
                    TokenMetrics::zeroed(&token_id)
                },
            };
            report.tokens.push(metrics);
        }

        report.protocol = self.get_protocol_metrics(true).await;

        info!(
            "Refreshed metrics of {} pairs and {} tokens ({} failures) in {:?}",
            report.pairs.len(),
            report.tokens.len(),
            report.failures,
            start.elapsed()
        );

        Ok(report)
    }

    // ==================== CACHE ====================

    /// Cached value when still fresh, else `compute` and store its result.
    async fn cached_or_compute<T, F>(
        &self,
        kind: &str,
        id: Option<&str>,
        force: bool,
        compute: F,
    ) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Timestamped,
        F: Future<Output = anyhow::Result<T>>,
    {
        if !force {
            if let Some(cached) = self.fresh::<T>(kind, id).await {
                return Ok(cached);
            }
        }

        let value = compute.await?;
        self.cache
            .set(Namespace::Metrics, kind, &value, None, id)
            .await;
        Ok(value)
    }

    async fn fresh<T: DeserializeOwned + Timestamped>(&self, kind: &str, id: Option<&str>) -> Option<T> {
        let cached: T = self.cache.get(Namespace::Metrics, kind, id).await?;
        let age = (unix_now() - cached.computed_at()).max(0) as u64;
        (age < self.cache.medium_ttl().as_secs()).then_some(cached)
    }

    async fn query<T, F>(&self, what: &str, query: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        bounded_query(self.repo_timeout, what, query)
            .await
            .ok_or_else(|| anyhow!("repository call {} failed", what))
    }

    // ==================== PAIRS ====================

    async fn pair_metrics(&self, pair_id: &str, force: bool) -> anyhow::Result<PairMetrics> {
        if !force {
            if let Some(cached) = self.fresh(PAIR_KEY, Some(pair_id)).await {
                return Ok(cached);
            }
        }

        let pair = self
            .query("get pair", self.repo.get_pair(pair_id))
            .await?
            .ok_or_else(|| anyhow!("pair {} not found", pair_id))?;
        self.pair_metrics_of(&pair, true).await
    }

    async fn pair_metrics_of(&self, pair: &Pair, force: bool) -> anyhow::Result<PairMetrics> {
        self.cached_or_compute(PAIR_KEY, Some(pair.id.as_str()), force, self.compute_pair(pair))
            .await
    }

    async fn compute_pair(&self, pair: &Pair) -> anyhow::Result<PairMetrics> {
        let now = unix_now();
        let ids = [pair.token0_id.clone(), pair.token1_id.clone()];

        let tokens = self.query("get pair tokens", self.repo.get_tokens(&ids)).await?;
        let decimals_of = |id: &str| {
            tokens
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.decimals)
                .ok_or_else(|| anyhow!("token {} of pair {} not found", id, pair.id))
        };
        let decimals0 = decimals_of(&pair.token0_id)?;
        let decimals1 = decimals_of(&pair.token1_id)?;

        let prices = self.resolver.get_usd_prices_bulk(&ids).await?;
        let price0 = prices.get(&pair.token0_id).copied().unwrap_or(0.0);
        let price1 = prices.get(&pair.token1_id).copied().unwrap_or(0.0);

        let amount0 = str_to_f64_with_decimals(&pair.reserve0, decimals0).unwrap_or(0.0);
        let amount1 = str_to_f64_with_decimals(&pair.reserve1, decimals1).unwrap_or(0.0);
        let tvl_usd = finite_or_zero(amount0 * price0 + amount1 * price1);

        let swaps = self
            .query(
                "find swaps by pair",
                self.repo.find_swaps_by_pair(&pair.id, swap_lookback(now)),
            )
            .await?;
        let values: Vec<(i64, f64)> = swaps
            .iter()
            .map(|s| (s.timestamp, swap_value_usd(s, decimals0, decimals1, price0, price1)))
            .collect();
        let volume = volume_windows(&values, now);

        Ok(PairMetrics {
            pair_id: pair.id.clone(),
            token0_price_usd: price0,
            token1_price_usd: price1,
            tvl_usd,
            volume,
            volume_change_24h: percent_change(volume.h24, volume.prev_h24),
            pool_apr: pool_apr(volume.h24, pair.fee_rate(self.settings.fee_rate), tvl_usd),
            computed_at: now,
        })
    }

    // ==================== TOKENS ====================

    async fn token_metrics(&self, token_id: &str, force: bool) -> anyhow::Result<TokenMetrics> {
        self.cached_or_compute(TOKEN_KEY, Some(token_id), force, self.compute_token(token_id))
            .await
    }

    async fn compute_token(&self, token_id: &str) -> anyhow::Result<TokenMetrics> {
        let now = unix_now();

        let token = self
            .query("get token", self.repo.get_token(token_id))
            .await?
            .ok_or_else(|| anyhow!("token {} not found", token_id))?;
        let price_usd = self.resolver.get_usd_price(token_id).await?;
        let supply = self
            .query("get token supply", self.repo.get_token_supply(token_id))
            .await?;
        let (market_cap_usd, fdv_usd) = valuation(price_usd, supply);

        let pairs: Vec<Pair> = self
            .query("find pairs by token", self.repo.find_pairs_by_token(token_id))
            .await?
            .into_iter()
            .filter(|p| p.contains(token_id) && p.is_active())
            .collect();

        // Liquidity on this token's side only
        let tvl_usd: f64 = pairs
            .iter()
            .filter_map(|p| p.reserves_for(token_id))
            .filter_map(|(own, _)| str_to_f64_with_decimals(own, token.decimals))
            .map(|amount| amount * price_usd)
            .sum();

        let pair_jobs: Vec<BoxFuture<'_, anyhow::Result<PairMetrics>>> = pairs
            .iter()
            .map(|pair| self.pair_metrics_of(pair, false).boxed())
            .collect();
        let pair_metrics: Vec<anyhow::Result<PairMetrics>> = stream::iter(pair_jobs)
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut volume = VolumeWindows::default();
        for metrics in pair_metrics {
            match metrics {
                Ok(metrics) => volume.add(&metrics.volume),
                Err(e) => warn!("Excluding a pair from token {} volume: {:#}", token_id, e),
            }
        }

        Ok(TokenMetrics {
            token_id: token.id,
            price_usd,
            market_cap_usd,
            fdv_usd,
            tvl_usd: finite_or_zero(tvl_usd),
            volume,
            volume_change_24h: percent_change(volume.h24, volume.prev_h24),
            pair_count: pairs.len() as u64,
            computed_at: now,
        })
    }

    // ==================== PROTOCOL ====================

    async fn compute_protocol(&self) -> anyhow::Result<ProtocolMetrics> {
        let now = unix_now();

        let pairs = self.query("list pairs", self.repo.list_pairs()).await?;
        let tokens = self.query("list tokens", self.repo.list_tokens()).await?;

        let pair_jobs: Vec<BoxFuture<'_, PairMetrics>> = pairs
            .iter()
            .map(|pair| {
                async move {
                    self.pair_metrics_of(pair, false).await.unwrap_or_else(|e| {
                        warn!("Excluding pair {} from protocol totals: {:#}", pair.id, e);
                        PairMetrics::zeroed(&pair.id)
                    })
                }
                .boxed()
            })
            .collect();
        let pair_metrics: Vec<PairMetrics> = stream::iter(pair_jobs)
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut volume = VolumeWindows::default();
        let mut tvl_usd = 0.0;
        for metrics in &pair_metrics {
            tvl_usd += metrics.tvl_usd;
            volume.add(&metrics.volume);
        }

        Ok(ProtocolMetrics {
            tvl_usd: finite_or_zero(tvl_usd),
            volume,
            volume_change_24h: percent_change(volume.h24, volume.prev_h24),
            pair_count: pairs.len() as u64,
            token_count: tokens.len() as u64,
            computed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::config::{CacheSettings, PricingSettings};
    use crate::db::memory::MemoryRepository;
    use crate::db::models::{Swap, TokenSupply};
    use crate::metrics::compute::{DAY, HOUR};

    const TOLERANCE: f64 = 1e-6;

    fn aggregator(repo: Arc<MemoryRepository>) -> MetricsAggregator {
        let cache = Arc::new(TieredCache::new(
            CacheSettings::default(),
            Arc::new(MemorySharedCache::new(1_000)),
        ));
        let resolver = Arc::new(PriceResolver::new(
            cache.clone(),
            repo.clone(),
            None,
            PricingSettings::default(),
        ));
        MetricsAggregator::new(
            cache,
            repo,
            resolver,
            MetricsSettings::default(),
            Duration::from_secs(1),
        )
    }

    fn swap(id: &str, pair_id: &str, age: i64, value_usd: f64) -> Swap {
        Swap {
            id: id.to_string(),
            pair_id: pair_id.to_string(),
            timestamp: unix_now() - age,
            amount_in0: "0".into(),
            amount_in1: "0".into(),
            amount_out0: "0".into(),
            amount_out1: "0".into(),
            value_usd: Some(value_usd),
        }
    }

    /// KKUB at $2 against USDT: $1000 on each side, $2000 TVL.
    fn market() -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new());
        repo.token("kkub", "KKUB", 18);
        repo.token("usdt", "USDT", 6);
        repo.pair("kkub-usdt", "kkub", "usdt", "500000000000000000000", "1000000000");
        repo.add_swap(swap("s1", "kkub-usdt", 10 * 60, 300.0));
        repo.add_swap(swap("s2", "kkub-usdt", 5 * HOUR, 100.0));
        repo.add_swap(swap("s3", "kkub-usdt", 30 * HOUR, 200.0));
        repo.add_swap(swap("s4", "kkub-usdt", 20 * DAY, 1000.0));
        repo
    }

    #[tokio::test]
    async fn test_pair_metrics() {
        let aggregator = aggregator(market());

        let m = aggregator.get_pair_metrics("kkub-usdt", false).await.unwrap();
        assert!((m.tvl_usd - 2_000.0).abs() < TOLERANCE, "tvl {}", m.tvl_usd);
        assert_eq!(m.volume.h1, 300.0);
        assert_eq!(m.volume.h24, 400.0);
        assert_eq!(m.volume.d7, 600.0);
        assert_eq!(m.volume.d30, 1_600.0);
        assert!((m.volume_change_24h - 100.0).abs() < TOLERANCE);
        // 400 * 0.003 / 2000 * 365 * 100
        assert!((m.pool_apr - 21.9).abs() < TOLERANCE, "apr {}", m.pool_apr);
        assert!(m.computed_at > 0);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_served_and_force_recomputes() {
        let repo = market();
        let aggregator = aggregator(repo.clone());

        let first = aggregator.get_pair_metrics("kkub-usdt", false).await.unwrap();
        repo.add_swap(swap("s5", "kkub-usdt", 60, 50.0));

        let cached = aggregator.get_pair_metrics("kkub-usdt", false).await.unwrap();
        assert_eq!(cached, first);

        let forced = aggregator.get_pair_metrics("kkub-usdt", true).await.unwrap();
        assert_eq!(forced.volume.h1, 350.0);
    }

    #[tokio::test]
    async fn test_stale_cached_value_is_recomputed() {
        let aggregator = aggregator(market());

        // Long cache TTL but a computation time past the freshness bound
        let stale = PairMetrics {
            computed_at: unix_now() - 10 * 60,
            tvl_usd: 1.0,
            ..PairMetrics::zeroed("kkub-usdt")
        };
        aggregator
            .cache
            .set(
                Namespace::Metrics,
                PAIR_KEY,
                &stale,
                Some(Duration::from_secs(3_600)),
                Some("kkub-usdt"),
            )
            .await;

        let m = aggregator.get_pair_metrics("kkub-usdt", false).await.unwrap();
        assert!((m.tvl_usd - 2_000.0).abs() < TOLERANCE);
    }

    #[tokio::test]
    async fn test_token_metrics() {
        let repo = market();
        repo.set_supply(
            "kkub",
            TokenSupply {
                total: Some(1_000.0),
                circulating: None,
            },
        );
        let aggregator = aggregator(repo);

        let m = aggregator.get_token_metrics("kkub", false).await.unwrap();
        assert!((m.price_usd - 2.0).abs() < TOLERANCE);
        assert!((m.market_cap_usd - 1_400.0).abs() < 1e-3);
        assert!((m.fdv_usd - 2_000.0).abs() < 1e-3);
        assert!((m.tvl_usd - 1_000.0).abs() < 1e-3);
        assert_eq!(m.volume.h24, 400.0);
        assert_eq!(m.pair_count, 1);
    }

    #[tokio::test]
    async fn test_protocol_metrics_and_mark_dirty() {
        let repo = market();
        let aggregator = aggregator(repo.clone());

        let before = aggregator.get_protocol_metrics(false).await;
        assert!((before.tvl_usd - 2_000.0).abs() < TOLERANCE);
        assert_eq!(before.pair_count, 1);
        assert_eq!(before.token_count, 2);

        repo.token("foo", "FOO", 18);
        assert_eq!(aggregator.get_protocol_metrics(false).await.token_count, 2);

        aggregator
            .mark_dirty(&DirtyEntity::Token("foo".to_string()))
            .await;
        assert_eq!(aggregator.get_protocol_metrics(false).await.token_count, 3);
    }

    #[tokio::test]
    async fn test_missing_entities_are_zeroed_and_bad_ids_rejected() {
        let aggregator = aggregator(market());

        let pair = aggregator.get_pair_metrics("nope", false).await.unwrap();
        assert_eq!(pair, PairMetrics::zeroed("nope"));

        let token = aggregator.get_token_metrics("nope", false).await.unwrap();
        assert_eq!(token, TokenMetrics::zeroed("nope"));

        assert_eq!(
            aggregator.get_pair_metrics("a:b", false).await,
            Err(EngineError::InvalidPairId("a:b".to_string()))
        );
        assert!(aggregator.get_token_metrics(" ", false).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_survives_entity_failure() {
        let repo = market();
        // References a token that does not exist
        repo.pair("ghost-usdt", "ghost", "usdt", "1000", "1000");
        let aggregator = aggregator(repo);

        let report = aggregator.refresh_all().await.unwrap();
        assert_eq!(report.pairs.len(), 2);
        assert_eq!(report.tokens.len(), 2);
        assert_eq!(report.failures, 1);

        let ghost = report
            .pairs
            .iter()
            .find(|m| m.pair_id == "ghost-usdt")
            .unwrap();
        assert_eq!(ghost, &PairMetrics::zeroed("ghost-usdt"));
        assert!((report.protocol.tvl_usd - 2_000.0).abs() < TOLERANCE);
    }
}

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::series::{build_series, ChartPoint};
use super::timeframe::Timeframe;
use crate::cache::{Namespace, TieredCache};
use crate::config::ChartSettings;
use crate::db::{
    bounded_query,
    models::{SnapshotEntity, Token, METRIC_PRICE_USD},
    Repository,
};
use crate::error::{is_valid_id, EngineError, EngineResult};
use crate::pricing::{by_liquidity, PriceResolver};
use crate::utils::unix_now;

/// Builds price charts from stored snapshots.
///
/// Token `price_usd` metric snapshots are the primary source. Tokens without
/// any fall back to their most liquid pair's exchange-rate snapshots, priced
/// with the counterpart's current USD price.
pub struct ChartSeriesBuilder {
    cache: Arc<TieredCache>,
    repo: Arc<dyn Repository>,
    resolver: Arc<PriceResolver>,
    settings: ChartSettings,
    repo_timeout: Duration,
}

impl ChartSeriesBuilder {
    pub fn new(
        cache: Arc<TieredCache>,
        repo: Arc<dyn Repository>,
        resolver: Arc<PriceResolver>,
        settings: ChartSettings,
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

    /// Ascending USD price series of a token. Unknown tokens or tokens
    /// without history yield an empty series.
    pub async fn get_series(
        &self,
        token_address: &str,
        timeframe: &str,
        limit: usize,
    ) -> EngineResult<Vec<ChartPoint>> {
        let address = normalize_address(token_address)
            .ok_or_else(|| EngineError::InvalidAddress(token_address.to_string()))?;
        let timeframe: Timeframe = timeframe.parse()?;
        let sub_key = format!("{}:{}", timeframe, limit);

        if let Some(series) = self
            .cache
            .get::<Vec<ChartPoint>>(Namespace::Chart, &address, Some(&sub_key))
            .await
        {
            return Ok(series);
        }

        let series = self.build(&address, timeframe, limit).await;
        if !series.is_empty() {
            self.cache
                .set(
                    Namespace::Chart,
                    &address,
                    &series,
                    Some(Duration::from_secs(self.settings.series_ttl_secs)),
                    Some(&sub_key),
                )
                .await;
        }

        Ok(series)
    }

    async fn build(&self, address: &str, timeframe: Timeframe, limit: usize) -> Vec<ChartPoint> {
        let Some(token) = bounded_query(
            self.repo_timeout,
            "get token by address",
            self.repo.get_token_by_address(address),
        )
        .await
        .flatten() else {
            debug!("No token with address {}, empty chart", address);
            return Vec::new();
        };

        let from = unix_now() - timeframe.window_secs();
        let mut rows = self.metric_rows(&token, from).await;
        if rows.is_empty() {
            rows = self.pair_rows(&token, from).await;
        }

        build_series(
            rows,
            timeframe,
            timeframe.effective_max_points(limit),
            self.settings.flat_epsilon,
        )
    }

    async fn metric_rows(&self, token: &Token, from: i64) -> Vec<(i64, Option<f64>)> {
        bounded_query(
            self.repo_timeout,
            "find price metric snapshots",
            self.repo
                .find_metric_snapshots(SnapshotEntity::Token, &token.id, METRIC_PRICE_USD, from),
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|s| (s.timestamp, s.value))
        .collect()
    }

    /// Exchange-rate snapshots of the most liquid active pair, in USD.
    async fn pair_rows(&self, token: &Token, from: i64) -> Vec<(i64, Option<f64>)> {
        let pairs = bounded_query(
            self.repo_timeout,
            "find pairs by token",
            self.repo.find_pairs_by_token(&token.id),
        )
        .await
        .unwrap_or_default();

        let Some(pair) = pairs
            .into_iter()
            .filter(|p| p.contains(&token.id) && p.is_active())
            .min_by(by_liquidity)
        else {
            return Vec::new();
        };
        let Some(counterpart) = pair.counterpart_of(&token.id) else {
            return Vec::new();
        };

        let counterpart_usd = self.resolver.get_usd_price(counterpart).await.unwrap_or(0.0);
        if counterpart_usd <= 0.0 {
            debug!(
                "Counterpart {} of pair {} has no price, empty chart for {}",
                counterpart, pair.id, token.id
            );
            return Vec::new();
        }

        // Snapshots hold token1 per token0
        let token_is_token0 = pair.token0_id == token.id;
        bounded_query(
            self.repo_timeout,
            "find price snapshots",
            self.repo.find_price_snapshots(&pair.id, from),
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|s| {
            let usd = s.price.filter(|p| *p > 0.0).map(|rate| {
                if token_is_token0 {
                    rate * counterpart_usd
                } else {
                    counterpart_usd / rate
                }
            });
            (s.timestamp, usd)
        })
        .collect()
    }
}

/// Lowercased `0x` address usable as a cache id.
fn normalize_address(address: &str) -> Option<String> {
    let address = address.trim().to_lowercase();
    (address.starts_with("0x") && address.len() > 2 && is_valid_id(&address)).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::config::{CacheSettings, PricingSettings};
    use crate::db::memory::MemoryRepository;
    use crate::db::models::MetricSnapshot;

    fn builder(repo: Arc<MemoryRepository>) -> ChartSeriesBuilder {
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
        ChartSeriesBuilder::new(
            cache,
            repo,
            resolver,
            ChartSettings::default(),
            Duration::from_secs(1),
        )
    }

    fn price_snapshot(token_id: &str, age: i64, value: f64) -> MetricSnapshot {
        MetricSnapshot::new(
            SnapshotEntity::Token,
            token_id,
            METRIC_PRICE_USD,
            unix_now() - age,
            value,
        )
    }

    /// KKUB at $2 against USDT.
    fn market() -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new());
        repo.token("kkub", "KKUB", 18);
        repo.token("usdt", "USDT", 6);
        repo.pair("kkub-usdt", "kkub", "usdt", "500000000000000000000", "1000000000");
        repo
    }

    #[tokio::test]
    async fn test_series_from_metric_snapshots() {
        let repo = market();
        for (age, value) in [(600, 2.0), (1_800, 1.5), (300, 2.5), (7_200, 9.0)] {
            repo.add_metric_snapshot(price_snapshot("kkub", age, value));
        }
        let builder = builder(repo);

        let series = builder.get_series("0xKKUB", "1h", 0).await.unwrap();
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        // oldest first, the 2h old point is outside the window
        assert_eq!(values, vec![1.5, 2.0, 2.5]);
    }

    #[tokio::test]
    async fn test_limit_caps_points() {
        let repo = market();
        for i in 0..200 {
            repo.add_metric_snapshot(price_snapshot("kkub", 10 + i * 300, 1.0 + i as f64));
        }
        let builder = builder(repo);

        let series = builder.get_series("0xkkub", "1d", 40).await.unwrap();
        assert_eq!(series.len(), 40);
        assert!(series.windows(2).all(|w| w[0].time < w[1].time));
        // most recent point retained
        assert_eq!(series.last().unwrap().value, 1.0);
    }

    #[tokio::test]
    async fn test_series_is_cached_per_timeframe_and_limit() {
        let repo = market();
        repo.add_metric_snapshot(price_snapshot("kkub", 600, 2.0));
        let builder = builder(repo.clone());

        let first = builder.get_series("0xkkub", "1d", 10).await.unwrap();
        repo.add_metric_snapshot(price_snapshot("kkub", 300, 3.0));

        assert_eq!(builder.get_series("0xkkub", "1d", 10).await.unwrap(), first);
        assert_eq!(builder.get_series("0xkkub", "1d", 20).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_pair_snapshots() {
        let repo = market();
        let now = unix_now();
        // 2 USDT per KKUB, then 3 USDT per KKUB
        repo.add_price_snapshot("kkub-usdt", now - 600, 2.0);
        repo.add_price_snapshot("kkub-usdt", now - 300, 3.0);
        let builder = builder(repo);

        let kkub = builder.get_series("0xkkub", "1d", 0).await.unwrap();
        assert_eq!(kkub.len(), 2);
        assert!((kkub[1].value - 3.0).abs() < 1e-6, "got {}", kkub[1].value);

        // USDT sits on the token1 side: rate is inverted and priced in KKUB
        let usdt = builder.get_series("0xusdt", "1d", 0).await.unwrap();
        assert_eq!(usdt.len(), 2);
        assert!((usdt[0].value - 1.0).abs() < 1e-6, "got {}", usdt[0].value);
    }

    #[tokio::test]
    async fn test_checksummed_stored_address_is_found() {
        let repo = market();
        repo.add_token(Token {
            id: "wbtc".to_string(),
            address: "0xAbCdEf0123".to_string(),
            symbol: "WBTC".to_string(),
            decimals: 8,
            price_usd: None,
            last_price_update: None,
        });
        repo.add_metric_snapshot(price_snapshot("wbtc", 600, 60_000.0));
        let builder = builder(repo);

        let series = builder.get_series("0xabcdef0123", "1d", 0).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 60_000.0);

        let same = builder.get_series("0xABCDEF0123", "1d", 0).await.unwrap();
        assert_eq!(same, series);
    }

    #[tokio::test]
    async fn test_contract_errors_and_empty_series() {
        let builder = builder(market());

        assert_eq!(
            builder.get_series("0xkkub", "2h", 0).await,
            Err(EngineError::UnknownTimeframe("2h".to_string()))
        );
        assert_eq!(
            builder.get_series("kkub", "1h", 0).await,
            Err(EngineError::InvalidAddress("kkub".to_string()))
        );
        assert!(builder.get_series("0xnope", "1h", 0).await.unwrap().is_empty());
        assert!(builder.get_series("0xkkub", "1h", 0).await.unwrap().is_empty());
    }
}

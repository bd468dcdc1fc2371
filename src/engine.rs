//! The engine's public surface.
//!
//! [`PriceEngine`] wires the tiered cache, price resolver, metrics
//! aggregator and chart builder over one repository, and is what request
//! handlers and background jobs hold.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use rustc_hash::FxHashMap;

use crate::cache::{CacheLevel, CacheStatsSnapshot, Namespace, SharedCache, TieredCache};
use crate::chart::{ChartPoint, ChartSeriesBuilder};
use crate::config::{CacheSettings, ChartSettings, MetricsSettings, PricingSettings, Settings};
use crate::db::Repository;
use crate::metrics::{
    DirtyEntity, MetricsAggregator, PairMetrics, ProtocolMetrics, SweepReport, TokenMetrics,
};
use crate::oracle::Oracle;
use crate::pricing::PriceResolver;
use crate::error::EngineResult;

/// Settings of the engine components, without connection details.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub cache: CacheSettings,
    pub pricing: PricingSettings,
    pub metrics: MetricsSettings,
    pub chart: ChartSettings,
}

impl From<&Settings> for EngineSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            cache: settings.cache.clone(),
            pricing: settings.pricing.clone(),
            metrics: settings.metrics.clone(),
            chart: settings.chart.clone(),
        }
    }
}

pub struct PriceEngine {
    cache: Arc<TieredCache>,
    repo: Arc<dyn Repository>,
    resolver: Arc<PriceResolver>,
    metrics: MetricsAggregator,
    charts: ChartSeriesBuilder,
}

impl PriceEngine {
    pub fn new(
        settings: EngineSettings,
        repo: Arc<dyn Repository>,
        shared: Arc<dyn SharedCache>,
        oracle: Option<Arc<dyn Oracle>>,
    ) -> Self {
        let repo_timeout = Duration::from_millis(settings.pricing.repository_timeout_ms);
        let cache = Arc::new(TieredCache::new(settings.cache, shared));
        let resolver = Arc::new(PriceResolver::new(
            cache.clone(),
            repo.clone(),
            oracle,
            settings.pricing,
        ));
        let metrics = MetricsAggregator::new(
            cache.clone(),
            repo.clone(),
            resolver.clone(),
            settings.metrics,
            repo_timeout,
        );
        let charts = ChartSeriesBuilder::new(
            cache.clone(),
            repo.clone(),
            resolver.clone(),
            settings.chart,
            repo_timeout,
        );

        Self {
            cache,
            repo,
            resolver,
            metrics,
            charts,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    // ==================== PRICES ====================

    pub async fn get_usd_price(&self, token_id: &str) -> EngineResult<f64> {
        self.resolver.get_usd_price(token_id).await
    }

    pub async fn get_usd_prices_bulk(&self, token_ids: &[String]) -> EngineResult<FxHashMap<String, f64>> {
        self.resolver.get_usd_prices_bulk(token_ids).await
    }

    // ==================== METRICS ====================

    pub async fn get_protocol_metrics(&self, force: bool) -> ProtocolMetrics {
        self.metrics.get_protocol_metrics(force).await
    }

    pub async fn get_pair_metrics(&self, pair_id: &str, force: bool) -> EngineResult<PairMetrics> {
        self.metrics.get_pair_metrics(pair_id, force).await
    }

    pub async fn get_token_metrics(
        &self,
        token_id: &str,
        force: bool,
    ) -> EngineResult<TokenMetrics> {
        self.metrics.get_token_metrics(token_id, force).await
    }

    pub async fn refresh_metrics(&self) -> anyhow::Result<SweepReport> {
        self.metrics.refresh_all().await
    }

    // ==================== CHARTS ====================

    pub async fn get_series(
        &self,
        token_address: &str,
        timeframe: &str,
        limit: usize,
    ) -> EngineResult<Vec<ChartPoint>> {
        self.charts.get_series(token_address, timeframe, limit).await
    }

    // ==================== CACHE ====================

    /// Forget cached metrics of an entity. A token update also drops its
    /// cached price.
    pub async fn mark_dirty(&self, entity: DirtyEntity) {
        if let DirtyEntity::Token(id) = &entity {
            self.cache.invalidate(Namespace::Price, id, None).await;
        }
        self.metrics.mark_dirty(&entity).await;
    }

    pub async fn invalidate_cache(&self, level: CacheLevel) {
        info!("Clearing cache ({:?})", level);
        self.cache.clear_all(level).await;
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

use std::sync::Arc;
use std::time::Duration;

use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use log::{debug, info};
use moka::future::Cache;
use num_traits::ToPrimitive;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::time::timeout;

use super::context::{PairView, ResolveContext};
use super::route::RoutePath;
use super::stablecoins::StablecoinSet;
use super::strategy::PriceSource;
use crate::cache::{Namespace, TieredCache};
use crate::config::PricingSettings;
use crate::db::{bounded_query, models::Token, Repository};
use crate::error::{is_valid_id, EngineError, EngineResult, OracleError};
use crate::oracle::Oracle;
use crate::utils::{is_sane_usd_price, one_whole_token, to_decimal};

/// Resolves a token's USD price through an ordered fallback chain:
///
/// 1. Tiered cache (`price` namespace)
/// 2. The token's persisted `price_usd`
/// 3. Reserves of the most liquid stablecoin pair
/// 4. Reserves of non-stable pairs, counterpart priced recursively
/// 5. On-chain TWAP oracle, or that pair's reserves on oracle errors
///
/// The first sane positive answer wins. `0.0` means "unknown".
///
/// Recursion carries a [`RoutePath`] so a token is never resolved twice on
/// the same chain. Derived prices (steps 3 to 5) are cached and written back
/// to the token row.
pub struct PriceResolver {
    cache: Arc<TieredCache>,
    repo: Arc<dyn Repository>,
    oracle: Option<Arc<dyn Oracle>>,
    stablecoins: StablecoinSet,
    settings: PricingSettings,
    /// Top-level resolutions in flight, keyed by token id
    in_flight: Cache<String, f64>,
}

impl PriceResolver {
    pub fn new(
        cache: Arc<TieredCache>,
        repo: Arc<dyn Repository>,
        oracle: Option<Arc<dyn Oracle>>,
        settings: PricingSettings,
    ) -> Self {
        // Entries are removed once answered; the TTL covers callers
        // cancelled before removal
        let in_flight = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(cache.default_ttl(Namespace::Price))
            .build();

        Self {
            cache,
            repo,
            oracle,
            stablecoins: StablecoinSet::new(&settings),
            settings,
            in_flight,
        }
    }

    fn repo_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.repository_timeout_ms)
    }

    fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.oracle_timeout_ms)
    }

    fn concurrency(&self) -> usize {
        self.settings.concurrency.max(1)
    }

    /// USD price of one whole token; `0.0` when no source yields a sane price.
    ///
    /// Concurrent calls for the same token share one resolution.
    pub async fn get_usd_price(&self, token_id: &str) -> EngineResult<f64> {
        if !is_valid_id(token_id) {
            return Err(EngineError::InvalidTokenId(token_id.to_string()));
        }

        let key = token_id.to_string();
        let price = self
            .in_flight
            .get_with(key.clone(), self.resolve_root(token_id))
            .await;
        self.in_flight.invalidate(&key).await;

        Ok(price)
    }

    /// Prices for many tokens at once: one bulk cache read, one bulk token
    /// read for the misses, then bounded parallel derivation and one bulk
    /// cache write. Every requested id is present in the result.
    pub async fn get_usd_prices_bulk(
        &self,
        token_ids: &[String],
    ) -> EngineResult<FxHashMap<String, f64>> {
        if let Some(bad) = token_ids.iter().find(|id| !is_valid_id(id)) {
            return Err(EngineError::InvalidTokenId(bad.clone()));
        }

        let mut seen = FxHashSet::default();
        let unique: Vec<String> = token_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut prices: FxHashMap<String, f64> = self
            .cache
            .get_bulk::<f64>(Namespace::Price, &unique)
            .await
            .into_iter()
            .filter(|(_, p)| p.is_finite() && *p > 0.0)
            .collect();

        let misses: Vec<String> = unique
            .iter()
            .filter(|id| !prices.contains_key(*id))
            .cloned()
            .collect();
        if misses.is_empty() {
            return Ok(prices);
        }

        let tokens = bounded_query(
            self.repo_timeout(),
            "get tokens",
            self.repo.get_tokens(&misses),
        )
        .await
        .unwrap_or_default();

        let mut to_derive = Vec::new();
        for token in tokens {
            match token.persisted_price() {
                Some(price) => {
                    prices.insert(token.id.clone(), price);
                },
                None => to_derive.push(token),
            }
        }

        let derivations: Vec<BoxFuture<'_, Option<(String, f64)>>> = to_derive
            .into_iter()
            .map(|token| {
                async move {
                    let id = token.id.clone();
                    let path = RoutePath::root(&id, self.settings.max_route_depth);
                    let ctx = ResolveContext::with_token(
                        self.repo.as_ref(),
                        self.repo_timeout(),
                        &id,
                        &path,
                        token,
                    );
                    let found = self.run_chain(&ctx, &PriceSource::DERIVED).await;
                    found.map(|(_, price)| (id.clone(), price))
                }
                .boxed()
            })
            .collect();
        let derived: Vec<(String, f64)> = stream::iter(derivations)
            .buffer_unordered(self.concurrency())
            .filter_map(|found| async move { found })
            .collect()
            .await;

        if !derived.is_empty() {
            self.cache.set_bulk(Namespace::Price, &derived, None).await;
            let writes: Vec<BoxFuture<'_, ()>> = derived
                .iter()
                .map(|(id, price)| self.persist(id, *price).boxed())
                .collect();
            stream::iter(writes)
                .for_each_concurrent(self.concurrency(), |write| write)
                .await;
            info!(
                "Derived {} of {} uncached token prices",
                derived.len(),
                misses.len()
            );
        }
        prices.extend(derived);

        for id in unique {
            prices.entry(id).or_insert(0.0);
        }
        Ok(prices)
    }

    async fn resolve_root(&self, token_id: &str) -> f64 {
        let path = RoutePath::root(token_id, self.settings.max_route_depth);
        self.resolve(token_id, &path).await
    }

    /// Full chain for one token on `path`. Boxed because it recurses through
    /// counterpart resolution.
    fn resolve<'a>(&'a self, token_id: &'a str, path: &'a RoutePath) -> BoxFuture<'a, f64> {
        async move {
            let ctx = ResolveContext::new(self.repo.as_ref(), self.repo_timeout(), token_id, path);

            match self.run_chain(&ctx, &PriceSource::CHAIN).await {
                Some((source, price)) => {
                    if source.is_derived() {
                        self.record(token_id, price).await;
                    }
                    price
                },
                None => {
                    debug!("No USD price for {} (path {})", token_id, path);
                    0.0
                },
            }
        }
        .boxed()
    }

    /// Run `chain` in order, stopping at the first sane positive price.
    async fn run_chain(
        &self,
        ctx: &ResolveContext<'_>,
        chain: &[PriceSource],
    ) -> Option<(PriceSource, f64)> {
        for &source in chain {
            let price = match source {
                PriceSource::Cache => self.from_cache(ctx).await,
                PriceSource::Persisted => self.from_persisted(ctx).await,
                PriceSource::StablecoinPair => self.from_stablecoin_pair(ctx).await,
                PriceSource::CrossToken => self.from_cross_token(ctx).await,
                PriceSource::Oracle => self.from_oracle(ctx).await,
            };

            match price {
                Some(price) if price.is_finite() && price > 0.0 => {
                    debug!("{} priced at {} from {}", ctx.token_id, price, source);
                    return Some((source, price));
                },
                _ => {},
            }
        }
        None
    }

    async fn record(&self, token_id: &str, price: f64) {
        self.cache
            .set(Namespace::Price, token_id, &price, None, None)
            .await;
        self.persist(token_id, price).await;
    }

    async fn persist(&self, token_id: &str, price: f64) {
        bounded_query(
            self.repo_timeout(),
            "update token price",
            self.repo.update_token_price(token_id, price),
        )
        .await;
    }

    /// Sanity band check for a candidate price of `token`.
    fn accept(&self, token: &Token, price: f64, source: PriceSource) -> Option<f64> {
        if is_sane_usd_price(price, self.stablecoins.contains(token)) {
            Some(price)
        } else {
            debug!(
                "Rejecting {} price {} for {} ({})",
                source, price, token.symbol, token.id
            );
            None
        }
    }

    // ============================================
    // Strategies
    // ============================================

    async fn from_cache(&self, ctx: &ResolveContext<'_>) -> Option<f64> {
        self.cache
            .get::<f64>(Namespace::Price, ctx.token_id, None)
            .await
    }

    async fn from_persisted(&self, ctx: &ResolveContext<'_>) -> Option<f64> {
        ctx.token().await?.persisted_price()
    }

    async fn from_stablecoin_pair(&self, ctx: &ResolveContext<'_>) -> Option<f64> {
        let token = ctx.token().await?;
        let best = ctx
            .pairs()
            .await
            .iter()
            .filter(|view| self.stablecoins.contains(&view.counterpart))
            .max_by(|a, b| a.counterpart_liquidity.cmp(&b.counterpart_liquidity))?;

        let rate = match best.rate(token.decimals) {
            Ok(rate) => rate,
            Err(e) => {
                debug!("Stablecoin pair {} unusable: {}", best.pair.id, e);
                return None;
            },
        };

        let stable_usd = self.stablecoin_usd(&best.counterpart, ctx.path).await;
        self.accept(token, rate * stable_usd, PriceSource::StablecoinPair)
    }

    async fn from_cross_token(&self, ctx: &ResolveContext<'_>) -> Option<f64> {
        let token = ctx.token().await?;

        // Pairs are already ordered by liquidity; ancestors on the path are
        // skipped rather than recursed into
        let candidates: Vec<(&PairView, RoutePath)> = ctx
            .pairs()
            .await
            .iter()
            .filter(|view| !self.stablecoins.contains(&view.counterpart))
            .filter_map(|view| ctx.path.extend(&view.counterpart.id).map(|next| (view, next)))
            .collect();

        let quotes: Vec<BoxFuture<'_, Option<f64>>> = candidates
            .into_iter()
            .map(|(view, next)| {
                async move {
                    let counterpart_usd = self.resolve(&view.counterpart.id, &next).await;
                    if counterpart_usd <= 0.0 {
                        return None;
                    }
                    let rate = view.rate(token.decimals).ok()?;
                    self.accept(token, rate * counterpart_usd, PriceSource::CrossToken)
                }
                .boxed()
            })
            .collect();
        let mut quotes = stream::iter(quotes).buffered(self.concurrency());

        while let Some(quote) = quotes.next().await {
            if quote.is_some() {
                return quote;
            }
        }
        None
    }

    async fn from_oracle(&self, ctx: &ResolveContext<'_>) -> Option<f64> {
        let oracle = self.oracle.as_deref()?;
        let token = ctx.token().await?;

        for view in ctx.pairs().await {
            let Some(units) = self.oracle_units(oracle, token, view).await else {
                continue;
            };
            let Some(counterpart_usd) = self.counterpart_usd(&view.counterpart, ctx.path).await
            else {
                continue;
            };
            if let Some(price) = self.accept(token, units * counterpart_usd, PriceSource::Oracle) {
                return Some(price);
            }
        }
        None
    }

    /// Counterpart units for one whole token from the oracle, or from the
    /// pair's reserves when the oracle reports a recoverable condition.
    async fn oracle_units(&self, oracle: &dyn Oracle, token: &Token, view: &PairView) -> Option<f64> {
        let pair_address = &view.pair.address;

        let initialized = timeout(self.oracle_timeout(), oracle.is_pair_initialized(pair_address))
            .await
            .unwrap_or(Err(OracleError::Timeout));
        match initialized {
            Ok(true) => {},
            Ok(false) => return None,
            Err(e) if e.falls_back_to_reserves() => {
                debug!("Oracle {} for pair {}, using reserves", e, view.pair.id);
                return view.rate(token.decimals).ok();
            },
            Err(e) => {
                debug!("Oracle skipped pair {}: {}", view.pair.id, e);
                return None;
            },
        }

        let amount_in = one_whole_token(token.decimals);
        let consulted = timeout(
            self.oracle_timeout(),
            oracle.consult(pair_address, &token.address, &amount_in, oracle.period_secs()),
        )
        .await
        .unwrap_or(Err(OracleError::Timeout));
        match consulted {
            Ok(amount_out) => to_decimal(&amount_out, view.counterpart.decimals).to_f64(),
            Err(e) if e.falls_back_to_reserves() => {
                debug!("Oracle {} for pair {}, using reserves", e, view.pair.id);
                view.rate(token.decimals).ok()
            },
            Err(e) => {
                debug!("Oracle skipped pair {}: {}", view.pair.id, e);
                None
            },
        }
    }

    async fn counterpart_usd(&self, counterpart: &Token, path: &RoutePath) -> Option<f64> {
        if self.stablecoins.contains(counterpart) {
            return Some(self.stablecoin_usd(counterpart, path).await);
        }

        let next = path.extend(&counterpart.id)?;
        let price = self.resolve(&counterpart.id, &next).await;
        (price > 0.0).then_some(price)
    }

    /// Market price of a stablecoin, derived like any other token with the
    /// current path as cycle guard. `1.0` only when that yields nothing sane.
    async fn stablecoin_usd(&self, stable: &Token, path: &RoutePath) -> f64 {
        if let Some(next) = path.extend(&stable.id) {
            let market = self.resolve(&stable.id, &next).await;
            if is_sane_usd_price(market, true) {
                return market;
            }
        }

        debug!(
            "No market price for stablecoin {} on path {}, assuming $1",
            stable.symbol, path
        );
        1.0
    }
}

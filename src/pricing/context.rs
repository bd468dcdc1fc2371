use std::cmp::Ordering;
use std::time::Duration;

use bigdecimal::BigDecimal;
use rustc_hash::FxHashMap;
use tokio::sync::OnceCell;

use super::route::RoutePath;
use crate::db::{
    bounded_query,
    models::{Pair, Token},
    Repository,
};
use crate::error::ReserveError;
use crate::utils::{reserve_math, str_to_decimal};

/// An active pair seen from one token's side.
#[derive(Debug, Clone)]
pub(crate) struct PairView {
    pub pair: Pair,
    pub token_is_token0: bool,
    pub counterpart: Token,
    /// Counterpart reserve in whole tokens
    pub counterpart_liquidity: BigDecimal,
}

impl PairView {
    fn new(pair: Pair, token_id: &str, counterpart: Token) -> Option<Self> {
        let token_is_token0 = pair.token0_id == token_id;
        let (_, counterpart_reserve) = pair.reserves_for(token_id)?;
        let counterpart_liquidity =
            str_to_decimal(counterpart_reserve, counterpart.decimals).ok()?;

        Some(Self {
            pair,
            token_is_token0,
            counterpart,
            counterpart_liquidity,
        })
    }

    fn own_reserve(&self) -> &str {
        if self.token_is_token0 {
            &self.pair.reserve0
        } else {
            &self.pair.reserve1
        }
    }

    fn counterpart_reserve(&self) -> &str {
        if self.token_is_token0 {
            &self.pair.reserve1
        } else {
            &self.pair.reserve0
        }
    }

    /// Counterpart units for one whole token, from reserves.
    pub fn rate(&self, token_decimals: u8) -> Result<f64, ReserveError> {
        reserve_math::price(
            self.own_reserve(),
            token_decimals,
            self.counterpart_reserve(),
            self.counterpart.decimals,
        )
    }
}

/// Most liquid first: higher `tvl_usd`, then the more recent pair.
pub(crate) fn by_liquidity(a: &Pair, b: &Pair) -> Ordering {
    let tvl_a = a.tvl_usd.unwrap_or(0.0);
    let tvl_b = b.tvl_usd.unwrap_or(0.0);
    tvl_b
        .total_cmp(&tvl_a)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Per-token state shared by the strategies of one resolution.
///
/// The token row and its pair views are loaded on first use, so the cache
/// step never touches the repository.
pub(crate) struct ResolveContext<'a> {
    repo: &'a dyn Repository,
    timeout: Duration,
    pub token_id: &'a str,
    pub path: &'a RoutePath,
    token: OnceCell<Option<Token>>,
    pairs: OnceCell<Vec<PairView>>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        timeout: Duration,
        token_id: &'a str,
        path: &'a RoutePath,
    ) -> Self {
        Self {
            repo,
            timeout,
            token_id,
            path,
            token: OnceCell::new(),
            pairs: OnceCell::new(),
        }
    }

    /// Context whose token row was already fetched (bulk resolution).
    pub fn with_token(
        repo: &'a dyn Repository,
        timeout: Duration,
        token_id: &'a str,
        path: &'a RoutePath,
        token: Token,
    ) -> Self {
        Self {
            token: OnceCell::new_with(Some(Some(token))),
            ..Self::new(repo, timeout, token_id, path)
        }
    }

    pub async fn token(&self) -> Option<&Token> {
        self.token
            .get_or_init(|| async {
                bounded_query(self.timeout, "get token", self.repo.get_token(self.token_id))
                    .await
                    .flatten()
            })
            .await
            .as_ref()
    }

    /// Active pairs of the token, most liquid first.
    pub async fn pairs(&self) -> &[PairView] {
        self.pairs.get_or_init(|| self.load_pairs()).await
    }

    async fn load_pairs(&self) -> Vec<PairView> {
        let token_id = self.token_id;
        let Some(pairs) = bounded_query(
            self.timeout,
            "find pairs by token",
            self.repo.find_pairs_by_token(token_id),
        )
        .await
        else {
            return Vec::new();
        };

        let mut active: Vec<Pair> = pairs
            .into_iter()
            .filter(|p| p.contains(token_id) && p.is_active())
            .collect();
        if active.is_empty() {
            return Vec::new();
        }
        active.sort_by(by_liquidity);

        let mut counterpart_ids: Vec<String> = active
            .iter()
            .filter_map(|p| p.counterpart_of(token_id).map(str::to_string))
            .collect();
        counterpart_ids.sort();
        counterpart_ids.dedup();

        let counterparts: FxHashMap<String, Token> = bounded_query(
            self.timeout,
            "get counterpart tokens",
            self.repo.get_tokens(&counterpart_ids),
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();

        active
            .into_iter()
            .filter_map(|pair| {
                let counterpart = counterparts.get(pair.counterpart_of(token_id)?)?.clone();
                PairView::new(pair, token_id, counterpart)
            })
            .collect()
    }
}

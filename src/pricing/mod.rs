//! USD price discovery over the pair graph.
//!
//! - [`PriceResolver`] - fallback chain with cycle guard and single-flight
//! - [`PriceSource`] - the named steps of that chain
//! - [`StablecoinSet`] - tokens treated as USD references

mod context;
mod resolver;
mod route;
mod stablecoins;
mod strategy;

pub(crate) use context::by_liquidity;
pub use resolver::PriceResolver;
pub use stablecoins::StablecoinSet;
pub use strategy::PriceSource;

//! Protocol, pair and token metrics.
//!
//! - [`aggregator`] - Cached computation and the update-all sweep
//! - [`compute`] - Volume windows, APR and valuation formulas
//! - [`types`] - Metric DTOs

mod aggregator;
pub(crate) mod compute;
mod types;

pub use aggregator::MetricsAggregator;
pub use types::{
    DirtyEntity, PairMetrics, ProtocolMetrics, SweepReport, TokenMetrics, VolumeWindows,
};

mod pair;
mod snapshot;
mod swap;
mod token;

pub use pair::Pair;
pub use snapshot::{MetricSnapshot, PriceSnapshot, SnapshotEntity, METRIC_PRICE_USD};
pub use swap::Swap;
pub use token::{Token, TokenSupply};

//! Token price charts.

mod builder;
mod series;
mod timeframe;

pub use builder::ChartSeriesBuilder;
pub use series::ChartPoint;
pub use timeframe::Timeframe;

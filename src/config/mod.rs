#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    CacheSettings, ChartSettings, ClickHouseSettings, CronSettings, MetricsSettings,
    OracleSettings, PostgresSettings, PricingSettings, Settings, TtlSettings,
};

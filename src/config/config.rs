use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Token metadata and persisted USD prices
/// - Pair reserves and pre-aggregated pair stats
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// ClickHouse connection configuration.
///
/// Holds the append-only time series: swaps, metric snapshots and pair
/// price snapshots.
#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// On-chain TWAP oracle configuration.
///
/// When this section is absent the oracle step of price resolution is
/// skipped entirely.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleSettings {
    pub rpc_url: String,
    /// Oracle contract address
    pub address: String,
    /// TWAP window passed to `consult`
    #[serde(default = "default_oracle_period")]
    pub period_secs: u32,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_ms: u64,
}

fn default_oracle_period() -> u32 {
    3600
}

fn default_oracle_timeout() -> u64 {
    5_000
}

/// Default TTL per cache namespace, in seconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TtlSettings {
    pub price: u64,
    pub token: u64,
    pub pair: u64,
    pub metrics: u64,
    pub chart: u64,
    pub user: u64,
}

impl Default for TtlSettings {
    fn default() -> Self {
        Self {
            price: 30,
            token: 300,
            pair: 300,
            metrics: 900,
            chart: 3600,
            user: 3600,
        }
    }
}

/// Tiered cache configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl: TtlSettings,
    /// Staleness bound for values carrying their own timestamp (metrics)
    pub medium_ttl_secs: u64,
    /// Minimum delay between two sweeps of expired local entries
    pub sweep_interval_secs: u64,
    /// Number of independently locked shards in the local tier
    pub local_shards: usize,
    /// Capacity of the in-process shared tier
    pub shared_max_capacity: u64,
    /// Upper bound on a single shared-tier round trip
    pub shared_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: TtlSettings::default(),
            medium_ttl_secs: 300,
            sweep_interval_secs: 60,
            local_shards: 16,
            shared_max_capacity: 100_000,
            shared_timeout_ms: 1_000,
        }
    }
}

/// Price resolution configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricingSettings {
    /// Stablecoin addresses in addition to the built-in symbol list
    pub stablecoin_addresses: Vec<String>,
    /// Stablecoin symbols in addition to the built-in symbol list
    pub stablecoin_symbols: Vec<String>,
    /// Maximum number of tokens on one routing path
    pub max_route_depth: usize,
    /// Parallel counterpart / bulk resolutions
    pub concurrency: usize,
    pub repository_timeout_ms: u64,
    /// Bound on each oracle call made while resolving
    pub oracle_timeout_ms: u64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            stablecoin_addresses: Vec::new(),
            stablecoin_symbols: Vec::new(),
            max_route_depth: 3,
            concurrency: 8,
            repository_timeout_ms: 3_000,
            oracle_timeout_ms: 5_000,
        }
    }
}

/// Metrics aggregation configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsSettings {
    /// LP fee rate used for APR when a pair does not carry its own
    pub fee_rate: f64,
    /// Parallel entities during the update-all sweep
    pub concurrency: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            fee_rate: 0.003,
            concurrency: 8,
        }
    }
}

/// Chart series configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartSettings {
    /// TTL of a whole cached series
    pub series_ttl_secs: u64,
    /// Values closer than this are considered flat
    pub flat_epsilon: f64,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            series_ttl_secs: 300,
            flat_epsilon: 1e-6,
        }
    }
}

/// Configuration for cron job intervals
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CronSettings {
    /// Interval for the metrics update-all sweep - default 5 minutes
    pub metrics_refresh_interval_secs: u64,
    /// Interval for taking token price snapshots - default 1 hour
    pub token_snapshot_interval_secs: u64,
    /// Interval for logging cache stats - default 5 minutes
    pub cache_stats_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            metrics_refresh_interval_secs: 300,
            token_snapshot_interval_secs: 3600,
            cache_stats_interval_secs: 300,
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, then overridden by `VALUER__*`
/// environment variables (`VALUER__POSTGRES__HOST`, ...).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub clickhouse: ClickHouseSettings,
    #[serde(default)]
    pub oracle: Option<OracleSettings>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("VALUER").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}

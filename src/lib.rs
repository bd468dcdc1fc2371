pub mod abis;
pub mod cache;
pub mod chart;
pub mod config;
pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod pricing;
pub mod utils;

pub use self::config::Settings;
pub use cron::CronScheduler;
pub use db::Database;
pub use engine::{EngineSettings, PriceEngine};
pub use error::{EngineError, EngineResult};

//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Recomputing pair, token and protocol metrics (the update-all sweep)
//! - Taking token price snapshots to ClickHouse for charts
//! - Logging tiered cache counters

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::CronSettings;
use crate::engine::PriceEngine;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    engine: Arc<PriceEngine>,
    settings: Arc<CronSettings>,
}

impl CronScheduler {
    pub fn new(engine: Arc<PriceEngine>, settings: CronSettings) -> Self {
        Self {
            engine,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_refresh_metrics_job(&scheduler).await?;
        self.register_token_snapshots_job(&scheduler).await?;
        self.register_cache_stats_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 3);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_refresh_metrics_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.engine.clone();
        let interval = self.settings.metrics_refresh_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = jobs::refresh_metrics::run(&engine).await {
                    error!("Failed to refresh metrics: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered refresh_metrics job (every {}s)", interval);
        Ok(())
    }

    async fn register_token_snapshots_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.engine.clone();
        let interval = self.settings.token_snapshot_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = jobs::token_snapshots::run(&engine).await {
                    error!("Failed to take token snapshots: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered token_snapshots job (every {}s)", interval);
        Ok(())
    }

    async fn register_cache_stats_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.engine.clone();
        let interval = self.settings.cache_stats_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                jobs::cache_stats::run(&engine);
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered cache_stats job (every {}s)", interval);
        Ok(())
    }
}

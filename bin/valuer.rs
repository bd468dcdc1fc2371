use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use valuer::{
    cache::MemorySharedCache,
    oracle::{Oracle, TwapOracle},
    CronScheduler, Database, EngineSettings, PriceEngine, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("Failed to install logger")?;

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let db = Arc::new(
        Database::new(&settings)
            .await
            .context("Failed to initialize database connection")?,
    );

    let shared = Arc::new(MemorySharedCache::new(settings.cache.shared_max_capacity));

    let oracle: Option<Arc<dyn Oracle>> = match &settings.oracle {
        Some(oracle_settings) => {
            let oracle = TwapOracle::new(oracle_settings)
                .context("Failed to initialize TWAP oracle client")?;
            info!("TWAP oracle enabled at {}", oracle_settings.address);
            Some(Arc::new(oracle) as Arc<dyn Oracle>)
        },
        None => {
            info!("No oracle configured, prices derive from reserves only");
            None
        },
    };

    let engine = Arc::new(PriceEngine::new(
        EngineSettings::from(&settings),
        db,
        shared,
        oracle,
    ));

    run(engine, &settings).await
}

async fn run(engine: Arc<PriceEngine>, settings: &Settings) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let cron_scheduler = CronScheduler::new(engine.clone(), settings.cron.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - background jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Valuer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    let stats = engine.cache_stats();
    info!(
        "Stopped. Cache hit rate over the run: {:.1}%",
        stats.hit_rate() * 100.0
    );
    Ok(())
}

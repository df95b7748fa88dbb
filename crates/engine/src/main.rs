use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use confluence_engine::config;
use confluence_engine::constants::{DEFAULT_CONFIG_DIR, OUTCOME_CHANNEL_CAPACITY};
use confluence_engine::core::market_data::{JsonCandleSource, MarketDataSource};
use confluence_engine::core::outcomes::{FeedbackWorker, OutcomeEvent, OutcomeTracker};
use confluence_engine::core::pipeline::SignalPipeline;
use confluence_engine::core::risk::{RiskEngine, RiskService};
use confluence_engine::core::scheduler::{command_channel, CycleScheduler, SnapshotStore};
use confluence_engine::core::service::SignalService;
use confluence_engine::core::weights::AdaptiveWeightManager;
use confluence_engine::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("ENGINE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        symbols = ?config.scheduler.symbols,
        timeframes = config.scheduler.timeframes.len(),
        interval_s = config.scheduler.cycle_interval_seconds,
        data_dir = %config.scheduler.data_dir,
        "confluence engine starting"
    );

    // -----------------------------------------------------------------------
    // Component construction (dependency injection order)
    // -----------------------------------------------------------------------

    // 1. Market data
    let data_dir = PathBuf::from(&config.scheduler.data_dir);
    if !data_dir.is_dir() {
        warn!(data_dir = %data_dir.display(), "candle data directory missing, pairs will fail until it exists");
    }
    let source: Arc<dyn MarketDataSource> = Arc::new(JsonCandleSource::new(&data_dir));

    // 2. Signal pipeline (indicators, patterns, regime, confluence)
    let pipeline = Arc::new(SignalPipeline::new(&config.signals));

    // 3. Adaptive weights + outcome history
    let weights = Arc::new(AdaptiveWeightManager::new(config.weights.clone()));
    let tracker = Arc::new(OutcomeTracker::new(config.weights.outcome_history));

    // 4. Monte Carlo risk
    let risk = Arc::new(RiskService::new(Arc::new(RiskEngine::new(config.risk.clone()))));

    // 5. Published snapshot
    let store = Arc::new(SnapshotStore::new());

    info!("all components initialized");

    // -----------------------------------------------------------------------
    // Channels and shutdown token
    // -----------------------------------------------------------------------

    let (outcome_tx, outcome_rx) = mpsc::channel::<OutcomeEvent>(OUTCOME_CHANNEL_CAPACITY);
    let (scheduler_handle, command_rx) = command_channel();
    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(CycleScheduler::new(
        config.scheduler.clone(),
        source,
        pipeline,
        weights.clone(),
        store.clone(),
        tracker.clone(),
        shutdown.clone(),
    ));

    let mut feedback = FeedbackWorker::new(tracker, weights.clone(), outcome_rx, shutdown.clone());

    // Held for the process lifetime: the scheduler loop and the feedback
    // worker stop once their last sender drops. The binary only runs the
    // periodic cycle; front-ends embed the library and drive these directly.
    let _service = SignalService::new(&config.scheduler, store, risk, weights, outcome_tx);
    let _scheduler_handle = scheduler_handle;

    // -----------------------------------------------------------------------
    // Launch concurrent tasks
    // -----------------------------------------------------------------------

    info!("spawning runtime tasks");

    let scheduler_task = tokio::spawn(async move {
        if let Err(e) = scheduler.run(command_rx).await {
            error!(error = %e, "cycle scheduler exited with error");
        }
    });

    let feedback_task = tokio::spawn(async move {
        if let Err(e) = feedback.run().await {
            error!(error = %e, "feedback worker exited with error");
        }
    });

    info!("all tasks running, press Ctrl+C to shutdown");

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    let (scheduler_res, feedback_res) = tokio::join!(scheduler_task, feedback_task);

    if let Err(e) = scheduler_res {
        error!(error = %e, "cycle scheduler task panicked");
    }
    if let Err(e) = feedback_res {
        error!(error = %e, "feedback worker task panicked");
    }

    info!("shutdown complete");
    Ok(())
}

//! Signal cycle scheduler.
//!
//! State machine IDLE → COMPUTING → PUBLISHED → IDLE, driven by a fixed
//! interval and by [`SchedulerCommand`]s. A full cycle rebalances weights,
//! takes one weight snapshot, fans pairs out to a bounded worker pool that
//! reports back over a channel, and swaps the staged results into the
//! published [`SnapshotStore`] in one step.

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::constants::SCHEDULER_COMMAND_CAPACITY;
use crate::core::market_data::MarketDataSource;
use crate::core::outcomes::OutcomeTracker;
use crate::core::pipeline::SignalPipeline;
use crate::core::weights::{AdaptiveWeightManager, WeightBook};
use crate::errors::EngineError;
use crate::types::{PairKey, Signal, Timeframe};

// ═══════════════════════════════════════════════════════════════════════════
// Published snapshot
// ═══════════════════════════════════════════════════════════════════════════

/// Immutable view of every published signal.
#[derive(Debug, Clone, Default)]
pub struct SignalSnapshot {
    pub signals: HashMap<PairKey, Arc<Signal>>,
    /// Unix milliseconds of the last publish or patch.
    pub published_at: i64,
    pub cycle: u64,
}

/// Copy-on-write holder of the current [`SignalSnapshot`].
#[derive(Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<SignalSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<SignalSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Merge a full cycle's staging map into a new snapshot and swap it in.
    ///
    /// Pairs missing from `staged` keep their previous signal. A published
    /// entry newer than the staged one (from a priority recompute that
    /// finished mid-cycle) is kept. Returns the signals that went live.
    pub fn publish(&self, staged: HashMap<PairKey, Arc<Signal>>, cycle: u64) -> Vec<Arc<Signal>> {
        let mut guard = self.current.write();
        let mut next = SignalSnapshot::clone(&guard);
        let mut live = Vec::with_capacity(staged.len());

        for (key, signal) in staged {
            match next.signals.get(&key) {
                Some(existing) if existing.timestamp > signal.timestamp => {
                    debug!(pair = %key, "keeping newer patched signal");
                }
                _ => {
                    live.push(Arc::clone(&signal));
                    next.signals.insert(key, signal);
                }
            }
        }
        next.cycle = cycle;
        next.published_at = now_ms();
        *guard = Arc::new(next);
        live
    }

    /// Replace only the given entries.
    pub fn patch(&self, updates: Vec<Arc<Signal>>) {
        let mut guard = self.current.write();
        let mut next = SignalSnapshot::clone(&guard);
        for signal in updates {
            next.signals
                .insert(PairKey::new(signal.symbol.clone(), signal.timeframe), signal);
        }
        next.published_at = now_ms();
        *guard = Arc::new(next);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Commands and state
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Computing,
    Published,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Computing => "COMPUTING",
            Self::Published => "PUBLISHED",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a full cycle now; the interval is not reset.
    RunCycle,
    /// Recompute every timeframe of one symbol and patch it in.
    PriorityRecompute {
        symbol: String,
        done: Option<oneshot::Sender<Result<usize, EngineError>>>,
    },
    Pause,
    Resume,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub computed: usize,
    pub failed: usize,
    pub published: usize,
}

/// Cloneable sender side of the scheduler's command channel.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn run_cycle(&self) -> Result<(), EngineError> {
        self.send(SchedulerCommand::RunCycle).await
    }

    /// Queue a priority recompute and wait for it to finish.
    pub async fn priority_recompute(&self, symbol: &str) -> Result<usize, EngineError> {
        let (done, rx) = oneshot::channel();
        self.send(SchedulerCommand::PriorityRecompute {
            symbol: symbol.to_uppercase(),
            done: Some(done),
        })
        .await?;
        rx.await
            .map_err(|_| EngineError::Worker("scheduler dropped recompute request".into()))?
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        self.send(SchedulerCommand::Resume).await
    }

    async fn send(&self, cmd: SchedulerCommand) -> Result<(), EngineError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::Worker("scheduler is not running".into()))
    }
}

/// Create a command channel for [`CycleScheduler::run`].
pub fn command_channel() -> (SchedulerHandle, mpsc::Receiver<SchedulerCommand>) {
    let (tx, rx) = mpsc::channel(SCHEDULER_COMMAND_CAPACITY);
    (SchedulerHandle { tx }, rx)
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

/// Result reported by a per-pair worker.
struct PairResult {
    key: PairKey,
    outcome: Result<Signal, EngineError>,
}

pub struct CycleScheduler {
    config: SchedulerConfig,
    source: Arc<dyn MarketDataSource>,
    pipeline: Arc<SignalPipeline>,
    weights: Arc<AdaptiveWeightManager>,
    store: Arc<SnapshotStore>,
    tracker: Arc<OutcomeTracker>,
    state: RwLock<CycleState>,
    paused: AtomicBool,
    cycle_counter: AtomicU64,
    /// Serialises full cycles.
    cycle_lock: tokio::sync::Mutex<()>,
    symbol_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    shutdown: CancellationToken,
}

impl CycleScheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn MarketDataSource>,
        pipeline: Arc<SignalPipeline>,
        weights: Arc<AdaptiveWeightManager>,
        store: Arc<SnapshotStore>,
        tracker: Arc<OutcomeTracker>,
        shutdown: CancellationToken,
    ) -> Self {
        let paused = AtomicBool::new(config.start_paused);
        Self {
            config,
            source,
            pipeline,
            weights,
            store,
            tracker,
            state: RwLock::new(CycleState::Idle),
            paused,
            cycle_counter: AtomicU64::new(0),
            cycle_lock: tokio::sync::Mutex::new(()),
            symbol_locks: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        info!(paused, "scheduler pause state changed");
    }

    pub fn is_tracked(&self, symbol: &str, timeframe: Option<Timeframe>) -> bool {
        self.config.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
            && timeframe.map_or(true, |tf| self.config.timeframes.contains(&tf))
    }

    fn set_state(&self, state: CycleState) {
        *self.state.write() = state;
        debug!(%state, "scheduler state");
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until shutdown. Full cycles run inline in this loop, so they never
    /// overlap; ticks missed while a cycle runs are delayed, not stacked.
    pub async fn run(self: Arc<Self>, mut commands: mpsc::Receiver<SchedulerCommand>) -> Result<()> {
        let period = Duration::from_secs(self.config.cycle_interval_seconds);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            symbols = self.config.symbols.len(),
            timeframes = self.config.timeframes.len(),
            interval_s = self.config.cycle_interval_seconds,
            max_concurrency = self.config.max_concurrency,
            paused = self.is_paused(),
            "cycle scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("cycle scheduler: shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if self.is_paused() {
                        debug!("cycle skipped: paused");
                        continue;
                    }
                    self.run_cycle().await;
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(SchedulerCommand::RunCycle) => {
                            self.run_cycle().await;
                        }
                        Some(SchedulerCommand::PriorityRecompute { symbol, done }) => {
                            // Off the loop so ticks keep flowing; the
                            // per-symbol lock serialises repeats.
                            let this = Arc::clone(&self);
                            tokio::spawn(async move {
                                let result = this.priority_recompute(&symbol).await;
                                if let Err(e) = &result {
                                    warn!(symbol = %symbol, error = %e, "priority recompute failed");
                                }
                                if let Some(done) = done {
                                    let _ = done.send(result);
                                }
                            });
                        }
                        Some(SchedulerCommand::Pause) => self.set_paused(true),
                        Some(SchedulerCommand::Resume) => self.set_paused(false),
                        None => {
                            info!("cycle scheduler: command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(CycleState::Idle);
        info!("cycle scheduler stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Full cycle
    // -----------------------------------------------------------------------

    /// Compute every tracked pair and publish. Returns `None` when another
    /// full cycle already holds the cycle lock.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("full cycle already running, request dropped");
            return None;
        };

        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(CycleState::Computing);

        let adjusted = self.weights.rebalance();
        let book = self.weights.snapshot();
        info!(cycle, weights_version = book.version, adjusted, "cycle started");

        let pairs: Vec<PairKey> = self
            .config
            .symbols
            .iter()
            .flat_map(|s| {
                self.config
                    .timeframes
                    .iter()
                    .map(move |tf| PairKey::new(s.to_uppercase(), *tf))
            })
            .collect();

        let results = self.compute_pairs(pairs, book).await;

        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };
        let mut staged: HashMap<PairKey, Arc<Signal>> = HashMap::with_capacity(results.len());
        for r in results {
            match r.outcome {
                Ok(signal) => {
                    report.computed += 1;
                    staged.insert(r.key, Arc::new(signal));
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(pair = %r.key, error = %e, "pair failed, previous signal kept");
                }
            }
        }

        let live = self.store.publish(staged, cycle);
        report.published = live.len();
        for signal in live {
            self.tracker.track(signal);
        }
        self.set_state(CycleState::Published);

        info!(
            cycle,
            computed = report.computed,
            failed = report.failed,
            published = report.published,
            "cycle published"
        );
        self.set_state(CycleState::Idle);
        Some(report)
    }

    /// Fan pairs out to workers bounded by `max_concurrency`; collect their
    /// reports from a channel.
    async fn compute_pairs(&self, pairs: Vec<PairKey>, book: Arc<WeightBook>) -> Vec<PairResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel::<PairResult>(pairs.len().max(1));
        let timeout = Duration::from_millis(self.config.candle_timeout_ms);
        let timestamp = now_ms();

        let mut handles = Vec::with_capacity(pairs.len());
        for key in pairs {
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let source = Arc::clone(&self.source);
            let pipeline = Arc::clone(&self.pipeline);
            let book = Arc::clone(&book);
            let shutdown = self.shutdown.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if shutdown.is_cancelled() {
                    return;
                }
                let outcome =
                    evaluate_pair(&*source, &pipeline, &key, &book, timeout, timestamp).await;
                let _ = tx.send(PairResult { key, outcome }).await;
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(handles.len());
        while let Some(r) = rx.recv().await {
            results.push(r);
        }
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "pair worker panicked");
            }
        }
        results
    }

    // -----------------------------------------------------------------------
    // Priority recompute
    // -----------------------------------------------------------------------

    /// Recompute all tracked timeframes of `symbol` and patch them into the
    /// published snapshot. Returns the number of signals patched.
    pub async fn priority_recompute(&self, symbol: &str) -> Result<usize, EngineError> {
        let symbol = symbol.to_uppercase();
        if !self.is_tracked(&symbol, None) {
            return Err(EngineError::invalid(format!("symbol {symbol} is not tracked")));
        }

        let lock = {
            let mut locks = self.symbol_locks.lock();
            Arc::clone(locks.entry(symbol.clone()).or_default())
        };
        let _guard = lock.lock().await;

        let book = self.weights.snapshot();
        let timeout = Duration::from_millis(self.config.candle_timeout_ms);
        let timestamp = now_ms();

        let mut updates = Vec::new();
        for tf in &self.config.timeframes {
            let key = PairKey::new(symbol.clone(), *tf);
            self.pipeline.reset(&key);
            match evaluate_pair(&*self.source, &self.pipeline, &key, &book, timeout, timestamp).await {
                Ok(signal) => updates.push(Arc::new(signal)),
                Err(e) => warn!(pair = %key, error = %e, "priority recompute: pair failed"),
            }
        }
        if updates.is_empty() {
            return Err(EngineError::DataUnavailable {
                symbol,
                timeframe: "*".into(),
                reason: "no timeframe could be recomputed".into(),
            });
        }

        for signal in &updates {
            self.tracker.track(Arc::clone(signal));
        }
        let patched = updates.len();
        self.store.patch(updates);
        info!(symbol = %symbol, patched, "priority recompute published");
        Ok(patched)
    }
}

/// Fetch candles under a timeout and evaluate one pair.
async fn evaluate_pair(
    source: &dyn MarketDataSource,
    pipeline: &SignalPipeline,
    key: &PairKey,
    book: &WeightBook,
    timeout: Duration,
    timestamp: i64,
) -> Result<Signal, EngineError> {
    let required = key.timeframe.required_candles();
    let candles = match tokio::time::timeout(
        timeout,
        source.get_candles(&key.symbol, key.timeframe, required),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(EngineError::ComputationTimeout {
                operation: format!("candle fetch for {key}"),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    };

    if candles.len() < required {
        debug!(pair = %key, available = candles.len(), required, "limited candle history");
    }

    Ok(pipeline.evaluate(
        &key.symbol,
        key.timeframe,
        &candles,
        book.table(key),
        timestamp,
    ))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_config, SignalConfig, WeightConfig};
    use crate::core::indicators::tests::candles_from_closes;
    use crate::core::market_data::testing::InMemorySource;
    use crate::types::Direction;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        scheduler: Arc<CycleScheduler>,
        source: Arc<InMemorySource>,
        store: Arc<SnapshotStore>,
        tracker: Arc<OutcomeTracker>,
        shutdown: CancellationToken,
    }

    fn harness() -> Harness {
        let config = test_config();
        let source = Arc::new(InMemorySource::default());
        let closes: Vec<Decimal> = (0..150).map(|i| Decimal::from(20_000 + i * 10)).collect();
        for symbol in &config.scheduler.symbols {
            for tf in &config.scheduler.timeframes {
                source.set(symbol, *tf, candles_from_closes(&closes, dec!(5)));
            }
        }
        let store = Arc::new(SnapshotStore::new());
        let tracker = Arc::new(OutcomeTracker::new(100));
        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(CycleScheduler::new(
            config.scheduler.clone(),
            source.clone(),
            Arc::new(SignalPipeline::new(&SignalConfig::default())),
            Arc::new(AdaptiveWeightManager::new(WeightConfig::default())),
            store.clone(),
            tracker.clone(),
            shutdown.clone(),
        ));
        Harness {
            scheduler,
            source,
            store,
            tracker,
            shutdown,
        }
    }

    fn signal(symbol: &str, tf: Timeframe, timestamp: i64) -> Arc<Signal> {
        let pipeline = SignalPipeline::new(&SignalConfig::default());
        Arc::new(pipeline.evaluate(
            symbol,
            tf,
            &[],
            &crate::config::default_initial_weights(),
            timestamp,
        ))
    }

    #[tokio::test]
    async fn test_full_cycle_publishes_every_pair() {
        let h = harness();
        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.computed, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(report.published, 4);

        let snap = h.store.load();
        assert_eq!(snap.cycle, 1);
        assert_eq!(snap.signals.len(), 4);
        assert_eq!(h.tracker.len(), 4);
        assert_eq!(h.scheduler.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_failed_pair_keeps_previous_signal() {
        let h = harness();
        h.scheduler.run_cycle().await.unwrap();
        let before = h.store.load();

        h.source.fail("ETHUSDT");
        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.computed, 2);

        let after = h.store.load();
        let key = PairKey::new("ETHUSDT", Timeframe::H1);
        assert_eq!(after.signals[&key].id, before.signals[&key].id);
        let btc = PairKey::new("BTCUSDT", Timeframe::H1);
        assert_ne!(after.signals[&btc].id, before.signals[&btc].id);
        // Superseded signals remain resolvable for outcome tracking.
        assert!(h.tracker.get(&before.signals[&btc].id).is_some());
    }

    #[tokio::test]
    async fn test_candle_timeout_is_isolated() {
        let h = harness();
        *h.source.delay.lock() = Some(Duration::from_millis(1500));
        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 4);
        assert!(h.store.load().signals.is_empty());
    }

    #[tokio::test]
    async fn test_slow_fetch_reports_computation_timeout() {
        let h = harness();
        *h.source.delay.lock() = Some(Duration::from_millis(200));
        let pipeline = SignalPipeline::new(&SignalConfig::default());
        let book = AdaptiveWeightManager::new(WeightConfig::default()).snapshot();
        let key = PairKey::new("BTCUSDT", Timeframe::H1);

        let err = evaluate_pair(
            h.source.as_ref(),
            &pipeline,
            &key,
            &book,
            Duration::from_millis(20),
            1,
        )
        .await
        .unwrap_err();
        match err {
            EngineError::ComputationTimeout { operation, timeout_ms } => {
                assert_eq!(timeout_ms, 20);
                assert!(operation.contains("BTCUSDT"), "{operation}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_dropped() {
        let h = harness();
        *h.source.delay.lock() = Some(Duration::from_millis(200));
        let s1 = Arc::clone(&h.scheduler);
        let s2 = Arc::clone(&h.scheduler);
        let (a, b) = tokio::join!(s1.run_cycle(), async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            s2.run_cycle().await
        });
        assert!(a.is_some());
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn test_priority_recompute_patches_one_symbol() {
        let h = harness();
        h.scheduler.run_cycle().await.unwrap();
        let before = h.store.load();

        let patched = h.scheduler.priority_recompute("btcusdt").await.unwrap();
        assert_eq!(patched, 2);

        let after = h.store.load();
        for tf in [Timeframe::H1, Timeframe::H4] {
            let btc = PairKey::new("BTCUSDT", tf);
            let eth = PairKey::new("ETHUSDT", tf);
            assert_ne!(after.signals[&btc].id, before.signals[&btc].id);
            assert_eq!(after.signals[&eth].id, before.signals[&eth].id);
        }
        assert_eq!(after.cycle, before.cycle);
    }

    #[tokio::test]
    async fn test_priority_recompute_rejects_untracked_symbol() {
        let h = harness();
        let err = h.scheduler.priority_recompute("DOGEUSDT").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_publish_keeps_newer_patched_entry() {
        let store = SnapshotStore::new();
        let key = PairKey::new("BTCUSDT", Timeframe::H1);
        let patched = signal("BTCUSDT", Timeframe::H1, 2_000);
        store.patch(vec![patched.clone()]);

        let stale = signal("BTCUSDT", Timeframe::H1, 1_000);
        let live = store.publish(HashMap::from([(key.clone(), stale)]), 7);
        assert!(live.is_empty());
        assert_eq!(store.load().signals[&key].id, patched.id);
        assert_eq!(store.load().cycle, 7);
    }

    #[test]
    fn test_snapshot_readers_unaffected_by_publish() {
        let store = SnapshotStore::new();
        let held = store.load();
        let key = PairKey::new("ETHUSDT", Timeframe::H4);
        store.publish(HashMap::from([(key.clone(), signal("ETHUSDT", Timeframe::H4, 1))]), 1);
        assert!(held.signals.is_empty());
        assert_eq!(store.load().signals[&key].direction, Direction::Neutral);
    }

    #[tokio::test]
    async fn test_run_loop_commands_and_shutdown() {
        let h = harness();
        let (handle, rx) = command_channel();
        let task = tokio::spawn(Arc::clone(&h.scheduler).run(rx));

        handle.pause().await.unwrap();
        handle.run_cycle().await.unwrap();
        let patched = handle.priority_recompute("ETHUSDT").await.unwrap();
        assert_eq!(patched, 2);
        assert!(h.scheduler.is_paused());
        handle.resume().await.unwrap();
        // Round-trip through the loop so Resume has been applied.
        handle.priority_recompute("BTCUSDT").await.unwrap();
        assert!(!h.scheduler.is_paused());

        h.shutdown.cancel();
        task.await.unwrap().unwrap();
        assert!(h.store.load().signals.len() >= 2);
    }

    #[tokio::test]
    async fn test_run_loop_stops_when_commands_close() {
        let h = harness();
        let (handle, rx) = command_channel();
        let task = tokio::spawn(Arc::clone(&h.scheduler).run(rx));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop should exit once every handle is gone")
            .unwrap()
            .unwrap();
        assert!(!h.shutdown.is_cancelled());
    }
}

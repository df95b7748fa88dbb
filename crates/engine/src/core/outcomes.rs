//! Outcome feedback: a bounded history of published signals and the worker
//! that grades realised outcomes into indicator weight updates.

use anyhow::Result;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::weights::AdaptiveWeightManager;
use crate::errors::EngineError;
use crate::types::{Direction, IndicatorKind, Signal};

/// Realised exit for a previously published signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub signal_id: Uuid,
    pub exit_price: Decimal,
    /// Unix milliseconds.
    pub exit_time: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Signal history
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct History {
    by_id: HashMap<Uuid, Arc<Signal>>,
    order: VecDeque<Uuid>,
}

/// Bounded FIFO of published signals, looked up by id when an outcome
/// arrives. Oldest entries are evicted once `capacity` is reached.
pub struct OutcomeTracker {
    capacity: usize,
    history: Mutex<History>,
}

impl OutcomeTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(History::default()),
        }
    }

    pub fn track(&self, signal: Arc<Signal>) {
        let mut h = self.history.lock();
        if h.by_id.insert(signal.id, signal.clone()).is_some() {
            return;
        }
        h.order.push_back(signal.id);
        while h.order.len() > self.capacity {
            if let Some(old) = h.order.pop_front() {
                h.by_id.remove(&old);
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Signal>> {
        self.history.lock().by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.history.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Grade each directional vote of `signal` against the realised move.
///
/// A vote succeeds when price moved strictly in its direction. Neutral votes
/// are not graded.
pub fn grade_votes(signal: &Signal, exit_price: Decimal) -> Vec<(IndicatorKind, bool)> {
    let moved = exit_price - signal.entry_price;
    signal
        .votes
        .iter()
        .filter(|v| v.direction != Direction::Neutral)
        .map(|v| (v.indicator, moved * v.direction.sign() > Decimal::ZERO))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Feedback worker
// ═══════════════════════════════════════════════════════════════════════════

pub struct FeedbackWorker {
    tracker: Arc<OutcomeTracker>,
    weights: Arc<AdaptiveWeightManager>,
    outcome_rx: mpsc::Receiver<OutcomeEvent>,
    shutdown: CancellationToken,
}

impl FeedbackWorker {
    pub fn new(
        tracker: Arc<OutcomeTracker>,
        weights: Arc<AdaptiveWeightManager>,
        outcome_rx: mpsc::Receiver<OutcomeEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            weights,
            outcome_rx,
            shutdown,
        }
    }

    /// Consume outcome events until shutdown or until every sender is gone.
    pub async fn run(&mut self) -> Result<()> {
        info!("feedback worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("feedback worker: shutdown signal received");
                    break;
                }
                event = self.outcome_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle(event) {
                                warn!(error = %e, signal_id = %event.signal_id, "outcome dropped");
                            }
                        }
                        None => {
                            info!("feedback worker: channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("feedback worker stopped");
        Ok(())
    }

    /// Grade one outcome and forward each vote to the weight manager.
    pub fn handle(&self, event: OutcomeEvent) -> Result<usize, EngineError> {
        let signal = self
            .tracker
            .get(&event.signal_id)
            .ok_or_else(|| EngineError::not_found(format!("signal {}", event.signal_id)))?;

        if event.exit_price <= Decimal::ZERO {
            return Err(EngineError::invalid(format!(
                "exit price must be positive, got {}",
                event.exit_price
            )));
        }

        let graded = grade_votes(&signal, event.exit_price);
        for (indicator, successful) in &graded {
            self.weights
                .record_outcome(*indicator, &signal.symbol, signal.timeframe, *successful);
        }

        debug!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            timeframe = %signal.timeframe,
            exit_price = %event.exit_price,
            exit_time = event.exit_time,
            graded = graded.len(),
            "outcome recorded"
        );
        Ok(graded.len())
    }
}

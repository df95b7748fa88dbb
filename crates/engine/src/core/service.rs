//! Read/write surface over the published snapshot, the risk engine and the
//! feedback channel.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::outcomes::OutcomeEvent;
use crate::core::risk::RiskService;
use crate::core::scheduler::SnapshotStore;
use crate::core::weights::AdaptiveWeightManager;
use crate::errors::EngineError;
use crate::types::{PairKey, RiskAssessment, Signal, Timeframe, WeightTable};

pub struct SignalService {
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    store: Arc<SnapshotStore>,
    risk: Arc<RiskService>,
    weights: Arc<AdaptiveWeightManager>,
    outcome_tx: mpsc::Sender<OutcomeEvent>,
}

impl SignalService {
    pub fn new(
        scheduler: &SchedulerConfig,
        store: Arc<SnapshotStore>,
        risk: Arc<RiskService>,
        weights: Arc<AdaptiveWeightManager>,
        outcome_tx: mpsc::Sender<OutcomeEvent>,
    ) -> Self {
        Self {
            symbols: scheduler.symbols.iter().map(|s| s.to_uppercase()).collect(),
            timeframes: scheduler.timeframes.clone(),
            store,
            risk,
            weights,
            outcome_tx,
        }
    }

    /// Published signals, optionally filtered, ordered by symbol then
    /// timeframe.
    pub fn get_signals(&self, symbol: Option<&str>, timeframe: Option<Timeframe>) -> Vec<Arc<Signal>> {
        let snapshot = self.store.load();
        let mut out: Vec<Arc<Signal>> = snapshot
            .signals
            .iter()
            .filter(|(key, _)| symbol.map_or(true, |s| key.symbol.eq_ignore_ascii_case(s)))
            .filter(|(key, _)| timeframe.map_or(true, |tf| key.timeframe == tf))
            .map(|(_, signal)| Arc::clone(signal))
            .collect();
        out.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then_with(|| a.timeframe.duration_secs().cmp(&b.timeframe.duration_secs()))
        });
        out
    }

    /// Monte Carlo assessment of the active signal for a tracked pair.
    pub async fn get_risk_assessment(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        iterations: Option<usize>,
    ) -> Result<RiskAssessment, EngineError> {
        let symbol = symbol.to_uppercase();
        if !self.symbols.contains(&symbol) {
            return Err(EngineError::invalid(format!("symbol {symbol} is not tracked")));
        }
        if !self.timeframes.contains(&timeframe) {
            return Err(EngineError::invalid(format!("timeframe {timeframe} is not tracked")));
        }

        let key = PairKey::new(symbol, timeframe);
        let signal = self
            .store
            .load()
            .signals
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("active signal for {key}")))?;

        debug!(pair = %key, signal_id = %signal.id, ?iterations, "risk assessment requested");
        self.risk.assess(signal, iterations).await
    }

    /// Queue a realised outcome for the feedback worker.
    pub async fn record_outcome(
        &self,
        signal_id: Uuid,
        exit_price: Decimal,
        exit_time: i64,
    ) -> Result<(), EngineError> {
        if exit_price <= Decimal::ZERO {
            return Err(EngineError::invalid(format!(
                "exit price must be positive, got {exit_price}"
            )));
        }
        self.outcome_tx
            .send(OutcomeEvent {
                signal_id,
                exit_price,
                exit_time,
            })
            .await
            .map_err(|_| EngineError::Worker("feedback worker is not running".into()))?;
        info!(%signal_id, %exit_price, exit_time, "outcome queued");
        Ok(())
    }

    pub fn current_weights(&self, symbol: &str, timeframe: Timeframe) -> WeightTable {
        self.weights.current_weights(&symbol.to_uppercase(), timeframe)
    }
}

//! Per-pair evaluation: candles to indicators, patterns and regime, then a
//! scored signal. Streaming indicator state is kept per (symbol, timeframe).

use tracing::debug;

use crate::config::SignalConfig;
use crate::core::confluence::{ConfluenceScorer, ScoringInput};
use crate::core::indicators::IndicatorCalculator;
use crate::core::patterns::PatternRecognizer;
use crate::core::regime::RegimeDetector;
use crate::types::{Candle, PairKey, Signal, Timeframe, WeightTable};

/// Candles → indicators → patterns / regime → confluence, for one pair.
pub struct SignalPipeline {
    indicators: IndicatorCalculator,
    patterns: PatternRecognizer,
    regime: RegimeDetector,
    scorer: ConfluenceScorer,
}

impl SignalPipeline {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            indicators: IndicatorCalculator::new(config.indicators.clone()),
            patterns: PatternRecognizer::new(config.patterns.clone()),
            regime: RegimeDetector::new(config.regime.clone()),
            scorer: ConfluenceScorer::new(config.confluence.clone()),
        }
    }

    /// Build a signal from `candles` (oldest first). An empty history yields
    /// a NEUTRAL signal, never an error.
    pub fn evaluate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        weights: &WeightTable,
        timestamp: i64,
    ) -> Signal {
        let indicators = self.indicators.compute(candles);
        let patterns = self.patterns.detect(candles);
        let regime = self.regime.classify(&indicators, candles);

        let signal = self.scorer.score(&ScoringInput {
            symbol,
            timeframe,
            indicators: &indicators,
            patterns: &patterns,
            regime: &regime,
            weights,
            timestamp,
        });

        debug!(
            symbol,
            %timeframe,
            candles = candles.len(),
            direction = %signal.direction,
            confidence = %signal.confidence,
            score = %signal.confluence_score,
            regime = %signal.regime.regime,
            patterns = signal.patterns.len(),
            "pair evaluated"
        );
        signal
    }

    /// Forget carried indicator state so the next evaluation of `key`
    /// replays its whole history.
    pub fn reset(&self, key: &PairKey) {
        self.indicators.reset(key);
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::types::{IndicatorKind, Timeframe};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub signals: SignalConfig,
    pub weights: WeightConfig,
    pub risk: RiskConfig,
    pub scheduler: SchedulerConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub file_name: String,
    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
}

fn default_log_file() -> String {
    "engine.log".into()
}

fn default_log_filter() -> String {
    "confluence_engine=info,warn".into()
}

// ---------------------------------------------------------------------------
// signals.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalConfig {
    #[serde(default)]
    pub indicators: IndicatorParams,
    #[serde(default)]
    pub patterns: PatternParams,
    #[serde(default)]
    pub regime: RegimeParams,
    #[serde(default)]
    pub confluence: ConfluenceParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: Decimal,
    pub atr_period: usize,
    pub stoch_k_period: usize,
    pub stoch_d_period: usize,
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub momentum_period: usize,
    pub volume_short: usize,
    pub volume_long: usize,
    pub support_resistance_lookback: usize,
    pub adx_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: dec!(2),
            atr_period: 14,
            stoch_k_period: 14,
            stoch_d_period: 3,
            sma_fast: 20,
            sma_slow: 50,
            momentum_period: 10,
            volume_short: 5,
            volume_long: 20,
            support_resistance_lookback: 20,
            adx_period: 14,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Trailing candles scanned for patterns.
    pub window: usize,
    /// Doji: body / range at or below this.
    pub doji_body_ratio: Decimal,
    /// Hammer / shooting star: long wick ≥ this × body.
    pub wick_body_ratio: Decimal,
    /// Bars before the signal candle that establish the prior trend.
    pub trend_lookback: usize,
    /// Bars on each side a pivot must dominate.
    pub pivot_strength: usize,
    /// Max relative distance between the two peaks of a double top/bottom.
    pub double_tolerance: Decimal,
    pub volume_spike_multiplier: Decimal,
    pub volume_average_period: usize,
    /// Max relative distance of price from a retracement level.
    pub fib_tolerance: Decimal,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            window: 50,
            doji_body_ratio: dec!(0.1),
            wick_body_ratio: dec!(2),
            trend_lookback: 5,
            pivot_strength: 2,
            double_tolerance: dec!(0.01),
            volume_spike_multiplier: dec!(2),
            volume_average_period: 20,
            fib_tolerance: dec!(0.005),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegimeParams {
    pub min_candles: usize,
    /// ATR / price above this is VOLATILE.
    pub volatile_atr_ratio: Decimal,
    pub trend_adx_threshold: Decimal,
    pub sma_period: usize,
    pub slope_lookback: usize,
    /// Relative SMA slope per bar that counts as trending.
    pub slope_threshold: Decimal,
}

impl Default for RegimeParams {
    fn default() -> Self {
        Self {
            min_candles: 30,
            volatile_atr_ratio: dec!(0.03),
            trend_adx_threshold: dec!(25),
            sma_period: 20,
            slope_lookback: 5,
            slope_threshold: dec!(0.001),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfluenceParams {
    /// |score| below this yields NEUTRAL.
    pub neutral_threshold: Decimal,
    /// Opposing evidence (in score points) on both sides above this is a conflict.
    pub conflict_threshold: Decimal,
    pub conflict_damping: Decimal,
    pub min_confidence: Decimal,
    pub max_confidence: Decimal,
    /// Reward multiple of the stop distance.
    pub risk_reward_ratio: Decimal,
    /// Minimum stop distance as a fraction of entry when ATR is flat.
    pub min_stop_pct: Decimal,
    /// Cap on the absolute pattern contribution in score points.
    pub pattern_cap: Decimal,
    pub candlestick_weight: Decimal,
    pub chart_weight: Decimal,
    pub volume_weight: Decimal,
    pub fibonacci_weight: Decimal,
    /// Regime bias at full regime confidence (0.2 = ±20%).
    pub regime_bias: Decimal,
    pub volatile_damping: Decimal,
}

impl Default for ConfluenceParams {
    fn default() -> Self {
        Self {
            neutral_threshold: dec!(15),
            conflict_threshold: dec!(5),
            conflict_damping: dec!(0.6),
            min_confidence: dec!(5),
            max_confidence: dec!(95),
            risk_reward_ratio: dec!(2),
            min_stop_pct: dec!(0.005),
            pattern_cap: dec!(25),
            candlestick_weight: dec!(0.08),
            chart_weight: dec!(0.12),
            volume_weight: dec!(0.05),
            fibonacci_weight: dec!(0.06),
            regime_bias: dec!(0.2),
            volatile_damping: dec!(0.8),
        }
    }
}

// ---------------------------------------------------------------------------
// weights.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// New outcomes per key before its weight is recomputed.
    pub update_threshold: u64,
    pub target_accuracy: Decimal,
    pub min_weight: Decimal,
    pub max_weight: Decimal,
    /// Starting weights; normalised on load.
    pub initial: BTreeMap<IndicatorKind, Decimal>,
    /// Superseded signals kept for outcome grading.
    pub outcome_history: usize,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            update_threshold: 10,
            target_accuracy: dec!(0.7),
            min_weight: dec!(0.01),
            max_weight: dec!(0.5),
            initial: default_initial_weights(),
            outcome_history: 2000,
        }
    }
}

pub fn default_initial_weights() -> BTreeMap<IndicatorKind, Decimal> {
    BTreeMap::from([
        (IndicatorKind::Rsi, dec!(0.15)),
        (IndicatorKind::Macd, dec!(0.15)),
        (IndicatorKind::Bollinger, dec!(0.12)),
        (IndicatorKind::Stochastic, dec!(0.12)),
        (IndicatorKind::SmaCross, dec!(0.14)),
        (IndicatorKind::Momentum, dec!(0.12)),
        (IndicatorKind::Volume, dec!(0.08)),
        (IndicatorKind::SupportResistance, dec!(0.12)),
    ])
}

// ---------------------------------------------------------------------------
// risk.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub default_iterations: usize,
    /// Hard cap on iterations per request.
    pub max_iterations: usize,
    /// Fixed RNG seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Upper clamp for the Kelly fraction.
    pub max_position_cap: Decimal,
    /// Fraction of full Kelly actually recommended.
    pub kelly_multiplier: Decimal,
    pub account_equity: Decimal,
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
    pub cache_size: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_iterations: 1000,
            max_iterations: 100_000,
            seed: None,
            max_position_cap: dec!(0.25),
            kelly_multiplier: dec!(0.5),
            account_equity: dec!(10000),
            timeout_ms: 5000,
            cache_ttl_seconds: 30,
            cache_size: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// scheduler.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_candle_timeout")]
    pub candle_timeout_ms: u64,
    #[serde(default)]
    pub start_paused: bool,
    /// Directory of `<SYMBOL>_<interval>.json` candle files.
    pub data_dir: String,
}

fn default_cycle_interval() -> u64 {
    240
}

fn default_max_concurrency() -> usize {
    16
}

fn default_candle_timeout() -> u64 {
    5000
}

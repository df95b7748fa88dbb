use anyhow::{bail, Result};
use rust_decimal::Decimal;

use super::types::EngineConfig;
use crate::types::IndicatorKind;

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`]. All violations are collected
/// and reported together.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_logging_config(config, &mut errors);
    validate_signals_config(config, &mut errors);
    validate_weights_config(config, &mut errors);
    validate_risk_config(config, &mut errors);
    validate_scheduler_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Logging config
// ---------------------------------------------------------------------------

fn validate_logging_config(config: &EngineConfig, errors: &mut Vec<String>) {
    if config.app.logging.log_dir.is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }
}

// ---------------------------------------------------------------------------
// Signals config
// ---------------------------------------------------------------------------

fn validate_signals_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let ind = &config.signals.indicators;

    let periods = [
        ("rsi_period", ind.rsi_period),
        ("macd_fast", ind.macd_fast),
        ("macd_slow", ind.macd_slow),
        ("macd_signal", ind.macd_signal),
        ("bb_period", ind.bb_period),
        ("atr_period", ind.atr_period),
        ("stoch_k_period", ind.stoch_k_period),
        ("stoch_d_period", ind.stoch_d_period),
        ("sma_fast", ind.sma_fast),
        ("sma_slow", ind.sma_slow),
        ("momentum_period", ind.momentum_period),
        ("volume_short", ind.volume_short),
        ("volume_long", ind.volume_long),
        ("support_resistance_lookback", ind.support_resistance_lookback),
        ("adx_period", ind.adx_period),
    ];
    for (name, value) in periods {
        if value == 0 {
            errors.push(format!("signals.indicators.{name}: must be > 0"));
        }
    }

    if ind.macd_fast >= ind.macd_slow {
        errors.push(format!(
            "signals.indicators: macd_fast ({}) must be < macd_slow ({})",
            ind.macd_fast, ind.macd_slow
        ));
    }
    if ind.sma_fast >= ind.sma_slow {
        errors.push(format!(
            "signals.indicators: sma_fast ({}) must be < sma_slow ({})",
            ind.sma_fast, ind.sma_slow
        ));
    }
    if ind.volume_short >= ind.volume_long {
        errors.push(format!(
            "signals.indicators: volume_short ({}) must be < volume_long ({})",
            ind.volume_short, ind.volume_long
        ));
    }
    if ind.bb_std <= Decimal::ZERO {
        errors.push(format!("signals.indicators: bb_std ({}) must be > 0", ind.bb_std));
    }

    let pat = &config.signals.patterns;
    if pat.window < 5 {
        errors.push(format!("signals.patterns: window ({}) must be >= 5", pat.window));
    }
    if pat.pivot_strength == 0 {
        errors.push("signals.patterns: pivot_strength must be > 0".into());
    }
    if pat.volume_spike_multiplier <= Decimal::ONE {
        errors.push(format!(
            "signals.patterns: volume_spike_multiplier ({}) must be > 1",
            pat.volume_spike_multiplier
        ));
    }

    let regime = &config.signals.regime;
    if regime.volatile_atr_ratio <= Decimal::ZERO {
        errors.push("signals.regime: volatile_atr_ratio must be > 0".into());
    }
    if regime.slope_lookback == 0 || regime.sma_period == 0 {
        errors.push("signals.regime: sma_period and slope_lookback must be > 0".into());
    }

    let conf = &config.signals.confluence;
    if conf.min_confidence < Decimal::ZERO
        || conf.max_confidence > Decimal::ONE_HUNDRED
        || conf.min_confidence >= conf.max_confidence
    {
        errors.push(format!(
            "signals.confluence: confidence bounds [{}, {}] must satisfy 0 <= min < max <= 100",
            conf.min_confidence, conf.max_confidence
        ));
    }
    if conf.risk_reward_ratio <= Decimal::ZERO {
        errors.push("signals.confluence: risk_reward_ratio must be > 0".into());
    }
    if conf.min_stop_pct <= Decimal::ZERO {
        errors.push("signals.confluence: min_stop_pct must be > 0".into());
    }
    if conf.conflict_damping <= Decimal::ZERO || conf.conflict_damping > Decimal::ONE {
        errors.push(format!(
            "signals.confluence: conflict_damping ({}) must be in (0, 1]",
            conf.conflict_damping
        ));
    }
}

// ---------------------------------------------------------------------------
// Weights config
// ---------------------------------------------------------------------------

fn validate_weights_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let w = &config.weights;

    if w.update_threshold == 0 {
        errors.push("weights: update_threshold must be > 0".into());
    }
    if w.target_accuracy <= Decimal::ZERO || w.target_accuracy > Decimal::ONE {
        errors.push(format!(
            "weights: target_accuracy ({}) must be in (0, 1]",
            w.target_accuracy
        ));
    }
    if w.min_weight <= Decimal::ZERO || w.min_weight >= w.max_weight {
        errors.push(format!(
            "weights: bounds [{}, {}] must satisfy 0 < min < max",
            w.min_weight, w.max_weight
        ));
    }

    // Renormalising to 1.0 within the bounds must be possible.
    let n = Decimal::from(IndicatorKind::ALL.len());
    if w.min_weight * n > Decimal::ONE || w.max_weight * n < Decimal::ONE {
        errors.push(format!(
            "weights: bounds [{}, {}] cannot sum to 1.0 over {} indicators",
            w.min_weight, w.max_weight, n
        ));
    }

    for (kind, value) in &w.initial {
        if *value <= Decimal::ZERO {
            errors.push(format!("weights.initial.{kind}: must be > 0, got {value}"));
        }
    }
    for kind in IndicatorKind::ALL {
        if !w.initial.contains_key(&kind) {
            errors.push(format!("weights.initial: missing indicator {kind}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Risk config
// ---------------------------------------------------------------------------

fn validate_risk_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let r = &config.risk;

    if r.max_iterations == 0 {
        errors.push("risk: max_iterations must be > 0".into());
    }
    if r.default_iterations == 0 || r.default_iterations > r.max_iterations {
        errors.push(format!(
            "risk: default_iterations ({}) must be in 1..={}",
            r.default_iterations, r.max_iterations
        ));
    }
    if r.max_position_cap <= Decimal::ZERO || r.max_position_cap > Decimal::ONE {
        errors.push(format!(
            "risk: max_position_cap ({}) must be in (0, 1]",
            r.max_position_cap
        ));
    }
    if r.kelly_multiplier <= Decimal::ZERO || r.kelly_multiplier > Decimal::ONE {
        errors.push(format!(
            "risk: kelly_multiplier ({}) must be in (0, 1]",
            r.kelly_multiplier
        ));
    }
    if r.account_equity <= Decimal::ZERO {
        errors.push("risk: account_equity must be > 0".into());
    }
    if r.timeout_ms == 0 {
        errors.push("risk: timeout_ms must be > 0".into());
    }
    if r.cache_size == 0 {
        errors.push("risk: cache_size must be > 0".into());
    }
}

// ---------------------------------------------------------------------------
// Scheduler config
// ---------------------------------------------------------------------------

fn validate_scheduler_config(config: &EngineConfig, errors: &mut Vec<String>) {
    let s = &config.scheduler;

    if s.symbols.is_empty() {
        errors.push("scheduler: symbols must not be empty".into());
    }
    for symbol in &s.symbols {
        if symbol.trim().is_empty() || symbol.chars().any(char::is_whitespace) {
            errors.push(format!("scheduler.symbols: invalid symbol '{symbol}'"));
        }
    }
    if s.timeframes.is_empty() {
        errors.push("scheduler: timeframes must not be empty".into());
    }
    if s.cycle_interval_seconds == 0 {
        errors.push("scheduler: cycle_interval_seconds must be > 0".into());
    }
    if s.max_concurrency == 0 {
        errors.push("scheduler: max_concurrency must be > 0".into());
    }
    if s.candle_timeout_ms == 0 {
        errors.push("scheduler: candle_timeout_ms must be > 0".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&test_config()).is_ok());
    }

    #[test]
    fn test_rejects_inverted_macd_periods() {
        let mut config = test_config();
        config.signals.indicators.macd_fast = 30;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("macd_fast"));
    }

    #[test]
    fn test_rejects_unsatisfiable_weight_bounds() {
        let mut config = test_config();
        config.weights.max_weight = dec!(0.1);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("cannot sum to 1.0"));
    }

    #[test]
    fn test_rejects_default_iterations_above_cap() {
        let mut config = test_config();
        config.risk.default_iterations = 200_000;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("default_iterations"));
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = test_config();
        config.scheduler.symbols.clear();
        config.scheduler.max_concurrency = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("2 errors"), "got: {err}");
        assert!(err.contains("symbols must not be empty"));
        assert!(err.contains("max_concurrency"));
    }

    #[test]
    fn test_rejects_symbol_with_whitespace() {
        let mut config = test_config();
        config.scheduler.symbols.push("BTC USDT".into());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid symbol"));
    }
}

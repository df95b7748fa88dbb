pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`EngineConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   signals.json
///   weights.json
///   risk.json
///   scheduler.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                       | Config Field                        |
/// |-------------------------------|-------------------------------------|
/// | `CYCLE_INTERVAL_SECONDS`      | `scheduler.cycle_interval_seconds`  |
/// | `TRACKED_SYMBOLS`             | `scheduler.symbols` (comma list)    |
/// | `ENGINE_DATA_DIR`             | `scheduler.data_dir`                |
/// | `SCHEDULER_START_PAUSED`      | `scheduler.start_paused`            |
/// | `MONTE_CARLO_SEED`            | `risk.seed`                         |
/// | `MONTE_CARLO_MAX_ITERATIONS`  | `risk.max_iterations`               |
/// | `ACCOUNT_EQUITY`              | `risk.account_equity`               |
pub fn load_config(config_dir: &Path) -> Result<EngineConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig =
        serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let signals: SignalConfig =
        serde_json::from_str(&read("signals.json")?).context("parsing signals.json")?;

    let weights: WeightConfig =
        serde_json::from_str(&read("weights.json")?).context("parsing weights.json")?;

    let risk: RiskConfig =
        serde_json::from_str(&read("risk.json")?).context("parsing risk.json")?;

    let scheduler: SchedulerConfig =
        serde_json::from_str(&read("scheduler.json")?).context("parsing scheduler.json")?;

    let mut config = EngineConfig {
        app,
        signals,
        weights,
        risk,
        scheduler,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are skipped (the JSON
/// value remains).
fn apply_env_overrides(config: &mut EngineConfig) {
    // -- Scheduler -----------------------------------------------------------
    if let Some(val) = env_parse::<u64>("CYCLE_INTERVAL_SECONDS") {
        info!(val, "env override: CYCLE_INTERVAL_SECONDS");
        config.scheduler.cycle_interval_seconds = val;
    }

    if let Some(val) = env_string("TRACKED_SYMBOLS") {
        let symbols: Vec<String> = val
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            info!(count = symbols.len(), "env override: TRACKED_SYMBOLS");
            config.scheduler.symbols = symbols;
        }
    }

    if let Some(val) = env_string("ENGINE_DATA_DIR") {
        info!(%val, "env override: ENGINE_DATA_DIR");
        config.scheduler.data_dir = val;
    }

    if let Some(val) = env_bool("SCHEDULER_START_PAUSED") {
        info!(start_paused = val, "env override: SCHEDULER_START_PAUSED");
        config.scheduler.start_paused = val;
    }

    // -- Risk ----------------------------------------------------------------
    if let Some(val) = env_parse::<u64>("MONTE_CARLO_SEED") {
        info!(val, "env override: MONTE_CARLO_SEED");
        config.risk.seed = Some(val);
    }

    if let Some(val) = env_parse::<usize>("MONTE_CARLO_MAX_ITERATIONS") {
        info!(val, "env override: MONTE_CARLO_MAX_ITERATIONS");
        config.risk.max_iterations = val;
    }

    if let Some(val) = env_decimal("ACCOUNT_EQUITY") {
        info!(%val, "env override: ACCOUNT_EQUITY");
        config.risk.account_equity = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

/// In-memory config with every default filled in, for unit tests.
#[cfg(test)]
pub(crate) fn test_config() -> EngineConfig {
    use crate::types::Timeframe;

    EngineConfig {
        app: AppConfig {
            logging: LoggingConfig {
                log_dir: "logs".into(),
                file_name: "engine.log".into(),
                default_filter: "confluence_engine=info,warn".into(),
            },
        },
        signals: SignalConfig::default(),
        weights: WeightConfig::default(),
        risk: RiskConfig {
            seed: Some(42),
            ..RiskConfig::default()
        },
        scheduler: SchedulerConfig {
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into()],
            timeframes: vec![Timeframe::H1, Timeframe::H4],
            cycle_interval_seconds: 240,
            max_concurrency: 4,
            candle_timeout_ms: 1000,
            start_paused: false,
            data_dir: "data/candles".into(),
        },
    }
}

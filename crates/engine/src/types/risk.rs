use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::Direction;

/// Summary of the simulated return distribution. All values are fractional
/// returns (0.01 = +1%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnDistribution {
    #[serde(with = "rust_decimal::serde::str")]
    pub mean: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub std_dev: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub min: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub p5: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub p25: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub p50: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub p75: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub p95: Decimal,
}

/// Monte Carlo risk estimate for one signal. Request-scoped, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub signal_id: Uuid,
    pub direction: Direction,
    pub iterations: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub expected_return: Decimal,
    /// Annualised standard deviation of simulated returns.
    #[serde(with = "rust_decimal::serde::str")]
    pub volatility: Decimal,
    /// 5th percentile return.
    #[serde(with = "rust_decimal::serde::str")]
    pub var95: Decimal,
    /// Mean of returns at or below `var95`.
    #[serde(with = "rust_decimal::serde::str")]
    pub cvar95: Decimal,
    /// Worst simulated return.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_drawdown: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub win_probability: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub sharpe_ratio: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub kelly_fraction: Decimal,
    /// Position notional in account currency.
    #[serde(with = "rust_decimal::serde::str")]
    pub recommended_position_size: Decimal,
    pub distribution: ReturnDistribution,
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prevailing trend / volatility state of a (symbol, timeframe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    /// Strong up-trend with moderate volatility.
    Bull,
    /// Strong down-trend.
    Bear,
    /// Weak trend, low volatility. Default for ambiguous evidence.
    Sideways,
    /// Volatility above threshold regardless of trend.
    Volatile,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bull => "BULL",
            Self::Bear => "BEAR",
            Self::Sideways => "SIDEWAYS",
            Self::Volatile => "VOLATILE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    /// Classification confidence in [0, 1].
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    /// Relative SMA slope per bar (fraction of price).
    #[serde(with = "rust_decimal::serde::str")]
    pub trend_slope: Decimal,
    /// ATR / price.
    #[serde(with = "rust_decimal::serde::str")]
    pub volatility_ratio: Decimal,
}

impl RegimeState {
    /// SIDEWAYS with low confidence, used whenever evidence is missing.
    pub fn insufficient() -> Self {
        Self {
            regime: MarketRegime::Sideways,
            confidence: dec!(0.2),
            trend_slope: Decimal::ZERO,
            volatility_ratio: Decimal::ZERO,
        }
    }
}

impl Default for RegimeState {
    fn default() -> Self {
        Self::insufficient()
    }
}

//! Candle timeframes tracked by the engine.
//!
//! Nine timeframes from 1-minute to daily candles. Each timeframe carries the
//! single canonical table of risk and confidence multipliers used by the
//! confluence scorer; no other per-timeframe weighting exists in the engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Supported candle timeframes.
///
/// Ordered from shortest to longest for iteration purposes. Serialized as the
/// exchange interval string (`"1m"`, `"4h"`, `"1d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All timeframes in ascending order (shortest to longest).
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::D1,
    ];

    /// Exchange kline interval string representation.
    #[must_use]
    pub fn as_interval(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::D1 => "1d",
        }
    }

    /// Parse from an exchange interval string.
    #[must_use]
    pub fn from_interval(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "2h" => Some(Self::H2),
            "4h" => Some(Self::H4),
            "6h" => Some(Self::H6),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }

    /// Duration in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1800,
            Self::H1 => 3600,
            Self::H2 => 7200,
            Self::H4 => 14400,
            Self::H6 => 21600,
            Self::D1 => 86400,
        }
    }

    /// Number of bars of this timeframe in a 365-day year, used to
    /// annualise per-bar volatility.
    #[must_use]
    pub fn bars_per_year(&self) -> f64 {
        (365 * 86_400) as f64 / self.duration_secs() as f64
    }

    /// ATR multiple used for stop-loss distance.
    ///
    /// Shorter timeframes get tighter stops. Take-profit distance is derived
    /// from this via the fixed risk:reward ratio.
    #[must_use]
    pub fn atr_stop_multiplier(&self) -> Decimal {
        match self {
            Self::M1 => dec!(1.0),
            Self::M5 => dec!(1.25),
            Self::M15 => dec!(1.5),
            Self::M30 => dec!(1.75),
            Self::H1 => dec!(2.0),
            Self::H2 => dec!(2.25),
            Self::H4 => dec!(2.5),
            Self::H6 => dec!(2.75),
            Self::D1 => dec!(3.0),
        }
    }

    /// Confidence multiplier applied to the final confluence score.
    ///
    /// Lower timeframes carry more noise and are discounted; the daily chart
    /// gets a small premium. 1h is the neutral reference.
    #[must_use]
    pub fn confidence_multiplier(&self) -> Decimal {
        match self {
            Self::M1 => dec!(0.85),
            Self::M5 => dec!(0.90),
            Self::M15 => dec!(0.95),
            Self::M30 => dec!(0.97),
            Self::H1 => dec!(1.00),
            Self::H2 => dec!(1.00),
            Self::H4 => dec!(1.05),
            Self::H6 => dec!(1.05),
            Self::D1 => dec!(1.10),
        }
    }

    /// Recommended number of historical candles to request per cycle.
    #[must_use]
    pub const fn required_candles(&self) -> usize {
        match self {
            Self::M1 | Self::M5 => 200,
            Self::M15 | Self::M30 => 150,
            Self::H1 | Self::H2 | Self::H4 | Self::H6 | Self::D1 => 100,
        }
    }

    /// Default holding horizon in bars for risk simulation.
    #[must_use]
    pub const fn holding_bars(&self) -> u32 {
        match self {
            Self::M1 => 60,
            Self::M5 => 24,
            Self::M15 => 16,
            Self::M30 => 12,
            Self::H1 => 8,
            Self::H2 => 6,
            Self::H4 => 6,
            Self::H6 => 4,
            Self::D1 => 5,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_interval())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_interval(s).ok_or_else(|| EngineError::invalid(format!("unknown timeframe '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_interval_roundtrip() {
        assert_eq!(Timeframe::M1.as_interval(), "1m");
        assert_eq!(Timeframe::H4.as_interval(), "4h");
        assert_eq!(Timeframe::from_interval("15m"), Some(Timeframe::M15));
        assert_eq!(Timeframe::from_interval("1d"), Some(Timeframe::D1));
        assert_eq!(Timeframe::from_interval("invalid"), None);
    }

    #[test]
    fn test_timeframe_from_str_rejects_unknown() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::H1);
        let err = "3h".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.duration_secs(), 60);
        assert_eq!(Timeframe::H1.duration_secs(), 3600);
        assert_eq!(Timeframe::D1.duration_secs(), 86400);
    }

    #[test]
    fn test_stop_multiplier_tightens_on_shorter_timeframes() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(
                pair[0].atr_stop_multiplier() < pair[1].atr_stop_multiplier(),
                "{} should be tighter than {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_confidence_multiplier_monotonic() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0].confidence_multiplier() <= pair[1].confidence_multiplier());
        }
        assert_eq!(Timeframe::H1.confidence_multiplier(), dec!(1.00));
    }

    #[test]
    fn test_timeframe_serde_uses_interval() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let tf: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(tf, Timeframe::M30);
    }

    #[test]
    fn test_timeframe_ordering() {
        assert!(Timeframe::M1 < Timeframe::M5);
        assert!(Timeframe::M5 < Timeframe::H1);
        assert!(Timeframe::H6 < Timeframe::D1);
    }
}

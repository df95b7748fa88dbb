use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Indicators that cast a vote in confluence scoring and carry an adaptive
/// weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    Bollinger,
    Stochastic,
    SmaCross,
    Momentum,
    Volume,
    SupportResistance,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 8] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Bollinger,
        IndicatorKind::Stochastic,
        IndicatorKind::SmaCross,
        IndicatorKind::Momentum,
        IndicatorKind::Volume,
        IndicatorKind::SupportResistance,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
            Self::Stochastic => "stochastic",
            Self::SmaCross => "sma_cross",
            Self::Momentum => "momentum",
            Self::Volume => "volume",
            Self::SupportResistance => "support_resistance",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MacdValues {
    #[serde(with = "rust_decimal::serde::str")]
    pub line: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub signal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub histogram: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BollingerBands {
    #[serde(with = "rust_decimal::serde::str")]
    pub upper: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub middle: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub lower: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StochasticValues {
    #[serde(with = "rust_decimal::serde::str")]
    pub k: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub d: Decimal,
}

/// Relationship between the fast and slow simple moving averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossState {
    /// Fast crossed above slow on the latest bar.
    GoldenCross,
    /// Fast crossed below slow on the latest bar.
    DeathCross,
    Above,
    Below,
    /// Not enough history for the slow average.
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmaCross {
    #[serde(with = "rust_decimal::serde::str")]
    pub fast: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub slow: Decimal,
    pub state: CrossState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeDirection {
    Rising,
    Falling,
    #[default]
    Flat,
}

/// Short vs long average volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeTrend {
    /// `avg(5) / avg(20)`; 1 when unavailable.
    #[serde(with = "rust_decimal::serde::str")]
    pub ratio: Decimal,
    pub direction: VolumeDirection,
}

/// Every indicator computed for one (symbol, timeframe) in one cycle.
///
/// Indicators without enough history hold their neutral default and are
/// listed in `unavailable`, so downstream scoring can discount them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// Last close, or zero when no candles were supplied.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi: Decimal,
    pub macd: MacdValues,
    pub bollinger: BollingerBands,
    #[serde(with = "rust_decimal::serde::str")]
    pub atr: Decimal,
    pub stochastic: StochasticValues,
    pub sma_cross: SmaCross,
    pub volume_trend: VolumeTrend,
    /// Rate of change over the momentum period, in percent.
    #[serde(with = "rust_decimal::serde::str")]
    pub momentum: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub support: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub resistance: Decimal,
    /// Wilder ADX; zero when unavailable.
    #[serde(with = "rust_decimal::serde::str")]
    pub adx: Decimal,
    pub candle_count: usize,
    pub unavailable: Vec<IndicatorKind>,
}

impl IndicatorSet {
    /// Fraction of voting indicators that had enough history, in [0, 1].
    pub fn coverage(&self) -> Decimal {
        let total = IndicatorKind::ALL.len();
        let missing = self
            .unavailable
            .iter()
            .filter(|k| IndicatorKind::ALL.contains(k))
            .count()
            .min(total);
        Decimal::from(total - missing) / Decimal::from(total)
    }

    pub fn is_available(&self, kind: IndicatorKind) -> bool {
        !self.unavailable.contains(&kind)
    }
}

impl Default for IndicatorSet {
    /// Full neutral defaults, as produced from an empty candle history.
    fn default() -> Self {
        Self {
            price: Decimal::ZERO,
            rsi: Decimal::from(50),
            macd: MacdValues::default(),
            bollinger: BollingerBands::default(),
            atr: Decimal::ZERO,
            stochastic: StochasticValues {
                k: Decimal::from(50),
                d: Decimal::from(50),
            },
            sma_cross: SmaCross::default(),
            volume_trend: VolumeTrend {
                ratio: Decimal::ONE,
                direction: VolumeDirection::Flat,
            },
            momentum: Decimal::ZERO,
            support: Decimal::ZERO,
            resistance: Decimal::ZERO,
            adx: Decimal::ZERO,
            candle_count: 0,
            unavailable: IndicatorKind::ALL.to_vec(),
        }
    }
}

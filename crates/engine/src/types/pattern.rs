use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    DoubleTop,
    DoubleBottom,
    AscendingTriangle,
    DescendingTriangle,
    SymmetricalTriangle,
    VolumeSpike,
    FibonacciRetracement,
}

impl PatternType {
    #[must_use]
    pub const fn category(&self) -> PatternCategory {
        match self {
            Self::Doji
            | Self::Hammer
            | Self::ShootingStar
            | Self::BullishEngulfing
            | Self::BearishEngulfing => PatternCategory::Candlestick,
            Self::DoubleTop
            | Self::DoubleBottom
            | Self::AscendingTriangle
            | Self::DescendingTriangle
            | Self::SymmetricalTriangle => PatternCategory::Chart,
            Self::VolumeSpike => PatternCategory::Volume,
            Self::FibonacciRetracement => PatternCategory::Fibonacci,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternCategory {
    Candlestick,
    Chart,
    Volume,
    Fibonacci,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternSignal {
    Bullish,
    Bearish,
    Neutral,
}

/// A pattern detected in the trailing candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub category: PatternCategory,
    pub signal: PatternSignal,
    /// Detection confidence in [0, 1].
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    pub timeframe: Timeframe,
    /// Price level the pattern refers to (neckline, fib level, spike close).
    #[serde(with = "rust_decimal::serde::str_option")]
    pub level: Option<Decimal>,
}

impl Pattern {
    /// Build a pattern with confidence clamped to [0, 1].
    pub fn new(
        pattern_type: PatternType,
        signal: PatternSignal,
        confidence: Decimal,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            pattern_type,
            category: pattern_type.category(),
            signal,
            confidence: confidence.clamp(Decimal::ZERO, Decimal::ONE),
            timeframe,
            level: None,
        }
    }

    pub fn with_level(mut self, level: Decimal) -> Self {
        self.level = Some(level);
        self
    }
}

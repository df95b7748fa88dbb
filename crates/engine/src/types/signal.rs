use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::indicator::{IndicatorKind, IndicatorSet};
use super::pattern::Pattern;
use super::regime::RegimeState;
use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT, 0 for NEUTRAL.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
            Self::Neutral => Decimal::ZERO,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
            Self::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// One indicator's contribution to a confluence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorVote {
    pub indicator: IndicatorKind,
    pub direction: Direction,
    /// Raw strength in [0, 100].
    #[serde(with = "rust_decimal::serde::str")]
    pub strength: Decimal,
    /// Weight taken from the cycle's weight snapshot.
    #[serde(with = "rust_decimal::serde::str")]
    pub weight: Decimal,
}

impl IndicatorVote {
    /// Signed weighted contribution `weight * strength * sign`.
    pub fn contribution(&self) -> Decimal {
        self.weight * self.strength * self.direction.sign()
    }
}

/// Published trading signal for one (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// Confidence in [0, 100].
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    /// `|take_profit - entry| / |entry - stop_loss|`; zero for NEUTRAL.
    #[serde(with = "rust_decimal::serde::str")]
    pub risk_reward_ratio: Decimal,
    pub reasoning: Vec<String>,
    /// Final score in [-100, 100]; positive favours LONG.
    #[serde(with = "rust_decimal::serde::str")]
    pub confluence_score: Decimal,
    pub indicators: IndicatorSet,
    pub votes: Vec<IndicatorVote>,
    pub patterns: Vec<Pattern>,
    pub regime: RegimeState,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
}

impl Signal {
    pub fn is_directional(&self) -> bool {
        self.direction != Direction::Neutral
    }
}

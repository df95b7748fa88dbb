//! Multi-indicator confluence scoring.
//!
//! Each indicator casts a vote with a strength in [0, 100]. Votes are
//! weighted by the cycle's weight snapshot into a score in [-100, 100]
//! (positive favours LONG), then adjusted by patterns, regime and conflict
//! before a direction, confidence and stop / target are derived.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::config::ConfluenceParams;
use crate::constants::CONFLICT_REASON;
use crate::types::{
    CrossState, Direction, IndicatorKind, IndicatorSet, IndicatorVote, MarketRegime, Pattern,
    PatternCategory, PatternSignal, RegimeState, Signal, Timeframe, VolumeDirection, WeightTable,
};

/// Everything the scorer needs for one (symbol, timeframe).
pub struct ScoringInput<'a> {
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub indicators: &'a IndicatorSet,
    pub patterns: &'a [Pattern],
    pub regime: &'a RegimeState,
    pub weights: &'a WeightTable,
    /// Signal timestamp, unix milliseconds.
    pub timestamp: i64,
}

pub struct ConfluenceScorer {
    params: ConfluenceParams,
}

impl ConfluenceScorer {
    pub fn new(params: ConfluenceParams) -> Self {
        Self { params }
    }

    pub fn score(&self, input: &ScoringInput<'_>) -> Signal {
        let p = &self.params;
        let ind = input.indicators;
        let mut reasoning = Vec::new();

        // 1. Votes.
        let votes: Vec<IndicatorVote> = IndicatorKind::ALL
            .iter()
            .map(|&kind| {
                let (direction, strength) = if ind.is_available(kind) {
                    vote(kind, ind)
                } else {
                    (Direction::Neutral, Decimal::ZERO)
                };
                IndicatorVote {
                    indicator: kind,
                    direction,
                    strength,
                    weight: input.weights.get(&kind).copied().unwrap_or(Decimal::ZERO),
                }
            })
            .collect();

        // 2. Weighted sum over the indicators that could vote.
        let available_weight: Decimal = votes
            .iter()
            .filter(|v| ind.is_available(v.indicator))
            .map(|v| v.weight)
            .sum();
        let (mut long_evidence, mut short_evidence) = (Decimal::ZERO, Decimal::ZERO);
        let mut score = Decimal::ZERO;
        if available_weight > Decimal::ZERO {
            for v in &votes {
                let c = v.contribution() / available_weight;
                if c > Decimal::ZERO {
                    long_evidence += c;
                } else {
                    short_evidence -= c;
                }
                score += c;
                if v.direction != Direction::Neutral {
                    reasoning.push(format!(
                        "{} {} (strength {})",
                        v.indicator,
                        v.direction,
                        v.strength.round_dp(1)
                    ));
                }
            }
        }
        score = clamp_score(score);

        // 3a. Patterns.
        let pattern_score = self.pattern_score(input.patterns);
        if pattern_score > Decimal::ZERO {
            long_evidence += pattern_score;
        } else {
            short_evidence -= pattern_score;
        }
        for pat in input.patterns.iter().filter(|p| p.signal != PatternSignal::Neutral) {
            reasoning.push(format!(
                "{:?} pattern ({:?}, confidence {})",
                pat.pattern_type,
                pat.signal,
                pat.confidence.round_dp(2)
            ));
        }
        score = clamp_score(score + pattern_score);

        // 3b. Regime bias.
        let regime = input.regime;
        let bias = p.regime_bias * regime.confidence;
        let factor = match regime.regime {
            MarketRegime::Bull if score > Decimal::ZERO => Decimal::ONE + bias,
            MarketRegime::Bull => Decimal::ONE - bias,
            MarketRegime::Bear if score < Decimal::ZERO => Decimal::ONE + bias,
            MarketRegime::Bear => Decimal::ONE - bias,
            MarketRegime::Volatile => {
                Decimal::ONE - (Decimal::ONE - p.volatile_damping) * regime.confidence
            }
            MarketRegime::Sideways => Decimal::ONE,
        };
        if factor != Decimal::ONE {
            reasoning.push(format!(
                "{} regime (confidence {}) adjusts score by x{}",
                regime.regime,
                regime.confidence.round_dp(2),
                factor.round_dp(3)
            ));
        }
        score = clamp_score(score * factor);

        // 4. Conflict.
        let conflicting =
            long_evidence >= p.conflict_threshold && short_evidence >= p.conflict_threshold;
        if conflicting {
            reasoning.push(CONFLICT_REASON.to_string());
        }

        // 5. Direction and confidence.
        let entry = ind.price;
        let direction = if entry <= Decimal::ZERO || score.abs() < p.neutral_threshold {
            Direction::Neutral
        } else if score > Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };

        let coverage = ind.coverage();
        let mut confidence = score.abs() * input.timeframe.confidence_multiplier();
        if coverage < Decimal::ONE {
            confidence *= dec!(0.5) + dec!(0.5) * coverage;
            reasoning.push(format!(
                "Limited history: {} of {} indicators available",
                IndicatorKind::ALL.len() - ind.unavailable.len().min(IndicatorKind::ALL.len()),
                IndicatorKind::ALL.len()
            ));
        }
        if conflicting {
            confidence *= p.conflict_damping;
        }
        let confidence = confidence.clamp(p.min_confidence, p.max_confidence);

        // 6. Stop / target.
        let (stop_loss, take_profit, risk_reward_ratio) = match direction {
            Direction::Neutral => (None, None, Decimal::ZERO),
            _ => {
                let atr_distance = ind.atr * input.timeframe.atr_stop_multiplier();
                let distance = atr_distance.max(entry * p.min_stop_pct);
                let sign = direction.sign();
                let stop = entry - sign * distance;
                let target = entry + sign * distance * p.risk_reward_ratio;
                let rr = (target - entry).abs() / (entry - stop).abs();
                (Some(stop), Some(target), rr)
            }
        };

        if direction == Direction::Neutral && reasoning.is_empty() {
            reasoning.push("No directional evidence".to_string());
        }

        Signal {
            id: Uuid::new_v4(),
            symbol: input.symbol.to_string(),
            timeframe: input.timeframe,
            direction,
            confidence,
            entry_price: entry,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            reasoning,
            confluence_score: score,
            indicators: ind.clone(),
            votes,
            patterns: input.patterns.to_vec(),
            regime: *regime,
            timestamp: input.timestamp,
        }
    }

    /// Signed pattern contribution in score points, capped at `pattern_cap`.
    fn pattern_score(&self, patterns: &[Pattern]) -> Decimal {
        let p = &self.params;
        let raw: Decimal = patterns
            .iter()
            .map(|pat| {
                let sign = match pat.signal {
                    PatternSignal::Bullish => Decimal::ONE,
                    PatternSignal::Bearish => Decimal::NEGATIVE_ONE,
                    PatternSignal::Neutral => return Decimal::ZERO,
                };
                let weight = match pat.category {
                    PatternCategory::Candlestick => p.candlestick_weight,
                    PatternCategory::Chart => p.chart_weight,
                    PatternCategory::Volume => p.volume_weight,
                    PatternCategory::Fibonacci => p.fibonacci_weight,
                };
                sign * pat.confidence * weight * dec!(100)
            })
            .sum();
        raw.clamp(-p.pattern_cap, p.pattern_cap)
    }
}

fn clamp_score(score: Decimal) -> Decimal {
    score.clamp(dec!(-100), dec!(100))
}

fn strength(x: Decimal) -> Decimal {
    x.clamp(Decimal::ZERO, dec!(100))
}

/// Direction and strength of a single available indicator.
fn vote(kind: IndicatorKind, ind: &IndicatorSet) -> (Direction, Decimal) {
    let price = ind.price;
    match kind {
        IndicatorKind::Rsi => {
            // A zero-loss RSI of 100 on a flat tape carries no information.
            if ind.is_available(IndicatorKind::Bollinger)
                && ind.bollinger.upper == ind.bollinger.lower
            {
                return (Direction::Neutral, Decimal::ZERO);
            }
            if ind.rsi < dec!(30) {
                (Direction::Long, strength((dec!(30) - ind.rsi) / dec!(30) * dec!(100)))
            } else if ind.rsi > dec!(70) {
                (Direction::Short, strength((ind.rsi - dec!(70)) / dec!(30) * dec!(100)))
            } else {
                (Direction::Neutral, Decimal::ZERO)
            }
        }
        IndicatorKind::Macd => {
            let hist = ind.macd.histogram;
            if hist.is_zero() || price <= Decimal::ZERO {
                return (Direction::Neutral, Decimal::ZERO);
            }
            let bps = hist.abs() / price * dec!(10000);
            let mut s = bps * dec!(5);
            // Line on the same side of zero confirms the histogram.
            if ind.macd.line.is_sign_positive() == hist.is_sign_positive() && !ind.macd.line.is_zero() {
                s += dec!(20);
            }
            let dir = if hist > Decimal::ZERO {
                Direction::Long
            } else {
                Direction::Short
            };
            (dir, strength(s))
        }
        IndicatorKind::Bollinger => {
            let bb = &ind.bollinger;
            let width = bb.upper - bb.lower;
            if width <= Decimal::ZERO {
                return (Direction::Neutral, Decimal::ZERO);
            }
            let pct_b = (price - bb.lower) / width;
            if pct_b <= dec!(0.2) {
                (Direction::Long, strength((dec!(0.2) - pct_b) / dec!(0.2) * dec!(100)))
            } else if pct_b >= dec!(0.8) {
                (Direction::Short, strength((pct_b - dec!(0.8)) / dec!(0.2) * dec!(100)))
            } else {
                (Direction::Neutral, Decimal::ZERO)
            }
        }
        IndicatorKind::Stochastic => {
            let k = ind.stochastic.k;
            if k < dec!(20) {
                (Direction::Long, strength((dec!(20) - k) / dec!(20) * dec!(100)))
            } else if k > dec!(80) {
                (Direction::Short, strength((k - dec!(80)) / dec!(20) * dec!(100)))
            } else {
                (Direction::Neutral, Decimal::ZERO)
            }
        }
        IndicatorKind::SmaCross => match ind.sma_cross.state {
            CrossState::GoldenCross => (Direction::Long, dec!(100)),
            CrossState::DeathCross => (Direction::Short, dec!(100)),
            CrossState::Above => (Direction::Long, dec!(60)),
            CrossState::Below => (Direction::Short, dec!(60)),
            CrossState::Neutral => (Direction::Neutral, Decimal::ZERO),
        },
        IndicatorKind::Momentum => momentum_vote(ind.momentum),
        IndicatorKind::Volume => {
            // Volume only confirms the direction price is already moving.
            let trend = &ind.volume_trend;
            if trend.direction != VolumeDirection::Rising {
                return (Direction::Neutral, Decimal::ZERO);
            }
            let (dir, _) = momentum_vote(ind.momentum);
            if dir == Direction::Neutral {
                return (Direction::Neutral, Decimal::ZERO);
            }
            (dir, strength((trend.ratio - Decimal::ONE) * dec!(100)))
        }
        IndicatorKind::SupportResistance => {
            let range = ind.resistance - ind.support;
            if range <= Decimal::ZERO {
                return (Direction::Neutral, Decimal::ZERO);
            }
            let pos = (price - ind.support) / range;
            if pos <= dec!(0.15) {
                (Direction::Long, strength((dec!(0.15) - pos) / dec!(0.15) * dec!(100)))
            } else if pos >= dec!(0.85) {
                (Direction::Short, strength((pos - dec!(0.85)) / dec!(0.15) * dec!(100)))
            } else {
                (Direction::Neutral, Decimal::ZERO)
            }
        }
    }
}

fn momentum_vote(roc: Decimal) -> (Direction, Decimal) {
    if roc > Decimal::ZERO {
        (Direction::Long, strength(roc * dec!(10)))
    } else if roc < Decimal::ZERO {
        (Direction::Short, strength(-roc * dec!(10)))
    } else {
        (Direction::Neutral, Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_initial_weights, IndicatorParams, PatternParams, RegimeParams};
    use crate::core::indicators::compute_indicators;
    use crate::core::indicators::tests::candles_from_closes;
    use crate::core::patterns::PatternRecognizer;
    use crate::core::regime::RegimeDetector;
    use crate::types::{BollingerBands, PatternType, SmaCross, VolumeTrend};
    use proptest::prelude::*;

    fn scorer() -> ConfluenceScorer {
        ConfluenceScorer::new(ConfluenceParams::default())
    }

    fn score_closes(closes: &[Decimal], spread: Decimal) -> Signal {
        let candles = candles_from_closes(closes, spread);
        let indicators = compute_indicators(&candles, &IndicatorParams::default());
        let patterns = PatternRecognizer::new(PatternParams::default()).detect(&candles);
        let regime = RegimeDetector::new(RegimeParams::default()).classify(&indicators, &candles);
        let weights = default_initial_weights();
        scorer().score(&ScoringInput {
            symbol: "BTCUSDT",
            timeframe: Timeframe::H1,
            indicators: &indicators,
            patterns: &patterns,
            regime: &regime,
            weights: &weights,
            timestamp: 0,
        })
    }

    /// Full-coverage set with every oscillator in its neutral zone.
    fn neutral_set(price: Decimal) -> IndicatorSet {
        IndicatorSet {
            price,
            rsi: dec!(50),
            bollinger: BollingerBands {
                upper: price + dec!(10),
                middle: price,
                lower: price - dec!(10),
            },
            atr: dec!(2),
            support: price - dec!(20),
            resistance: price + dec!(20),
            unavailable: Vec::new(),
            candle_count: 200,
            ..IndicatorSet::default()
        }
    }

    fn score_set(set: &IndicatorSet, patterns: &[Pattern], regime: &RegimeState) -> Signal {
        let weights = default_initial_weights();
        scorer().score(&ScoringInput {
            symbol: "ETHUSDT",
            timeframe: Timeframe::H4,
            indicators: set,
            patterns,
            regime,
            weights: &weights,
            timestamp: 1,
        })
    }

    #[test]
    fn test_no_candles_is_neutral_low_confidence() {
        let weights = default_initial_weights();
        let signal = scorer().score(&ScoringInput {
            symbol: "SOLUSDT",
            timeframe: Timeframe::M15,
            indicators: &IndicatorSet::default(),
            patterns: &[],
            regime: &RegimeState::insufficient(),
            weights: &weights,
            timestamp: 0,
        });
        assert_eq!(signal.direction, Direction::Neutral);
        assert!(signal.confidence <= dec!(20));
        assert!(signal.stop_loss.is_none() && signal.take_profit.is_none());
        assert_eq!(signal.risk_reward_ratio, Decimal::ZERO);
    }

    #[test]
    fn test_overbought_rally_is_not_long() {
        let closes: Vec<Decimal> = (0..20).map(|i| Decimal::from(100 + i)).collect();
        let signal = score_closes(&closes, dec!(0.5));

        assert!(signal.indicators.rsi > dec!(70));
        let rsi_vote = signal
            .votes
            .iter()
            .find(|v| v.indicator == IndicatorKind::Rsi)
            .unwrap();
        assert_eq!(rsi_vote.direction, Direction::Short);
        assert_ne!(signal.direction, Direction::Long);
        assert!(signal.reasoning.iter().any(|r| r == CONFLICT_REASON));
    }

    #[test]
    fn test_flat_tape_neutralises_rsi() {
        let signal = score_closes(&vec![dec!(100); 60], Decimal::ZERO);
        assert_eq!(signal.indicators.rsi, dec!(100));
        assert_eq!(signal.direction, Direction::Neutral);
    }

    #[test]
    fn test_rsi_votes_before_bollinger_has_history() {
        // 18 falling closes: RSI is warm, Bollinger still needs 20.
        let closes: Vec<Decimal> = (0..18).map(|i| Decimal::from(200 - i * 3)).collect();
        let candles = candles_from_closes(&closes, dec!(0.5));
        let indicators = compute_indicators(&candles, &IndicatorParams::default());
        assert!(indicators.is_available(IndicatorKind::Rsi));
        assert!(!indicators.is_available(IndicatorKind::Bollinger));
        assert_eq!(indicators.bollinger.upper, indicators.bollinger.lower);

        let signal = score_closes(&closes, dec!(0.5));
        let rsi = signal
            .votes
            .iter()
            .find(|v| v.indicator == IndicatorKind::Rsi)
            .unwrap();
        assert_eq!(rsi.direction, Direction::Long);
        assert!(rsi.strength > dec!(90), "rsi strength {}", rsi.strength);
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_neutral_indicators_give_neutral() {
        let signal = score_set(&neutral_set(dec!(100)), &[], &RegimeState::insufficient());
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.confluence_score, Decimal::ZERO);
        assert_eq!(signal.confidence, dec!(5));
    }

    #[test]
    fn test_oversold_agreement_is_long_with_stops() {
        let mut set = neutral_set(dec!(100));
        set.rsi = dec!(15);
        set.stochastic.k = dec!(5);
        set.bollinger.lower = dec!(101);
        set.bollinger.upper = dec!(121);
        set.sma_cross = SmaCross {
            fast: dec!(99),
            slow: dec!(98),
            state: CrossState::GoldenCross,
        };
        let signal = score_set(&set, &[], &RegimeState::insufficient());

        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.confluence_score > Decimal::ZERO);
        let stop = signal.stop_loss.unwrap();
        let target = signal.take_profit.unwrap();
        assert!(stop < signal.entry_price && target > signal.entry_price);
        // ATR 2 × 4h multiplier 2.5 = 5 below entry, target at 1:2.
        assert_eq!(stop, dec!(95));
        assert_eq!(target, dec!(110));
        assert_eq!(signal.risk_reward_ratio, dec!(2));
        assert!(!signal.reasoning.iter().any(|r| r == CONFLICT_REASON));
    }

    #[test]
    fn test_flat_atr_uses_minimum_stop() {
        let mut set = neutral_set(dec!(200));
        set.atr = Decimal::ZERO;
        set.rsi = dec!(90);
        set.stochastic.k = dec!(99);
        set.sma_cross.state = CrossState::DeathCross;
        let signal = score_set(&set, &[], &RegimeState::insufficient());
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.stop_loss, Some(dec!(201)));
        assert_eq!(signal.take_profit, Some(dec!(198)));
    }

    #[test]
    fn test_bear_regime_dampens_long() {
        let mut set = neutral_set(dec!(100));
        set.sma_cross.state = CrossState::GoldenCross;
        set.momentum = dec!(5);
        let sideways = score_set(&set, &[], &RegimeState::insufficient());
        let bear = score_set(
            &set,
            &[],
            &RegimeState {
                regime: MarketRegime::Bear,
                confidence: dec!(0.9),
                ..RegimeState::insufficient()
            },
        );
        assert!(bear.confluence_score < sideways.confluence_score);
        assert!(bear.confluence_score > Decimal::ZERO);
    }

    #[test]
    fn test_pattern_contribution_is_capped() {
        let set = neutral_set(dec!(100));
        let patterns: Vec<Pattern> = (0..20)
            .map(|_| Pattern::new(PatternType::DoubleBottom, PatternSignal::Bullish, dec!(1), Timeframe::H4))
            .collect();
        let signal = score_set(&set, &patterns, &RegimeState::insufficient());
        assert_eq!(signal.confluence_score, dec!(25));
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_conflict_damps_confidence() {
        let mut agree = neutral_set(dec!(100));
        agree.rsi = dec!(10);
        agree.stochastic.k = dec!(2);
        agree.sma_cross.state = CrossState::GoldenCross;
        agree.momentum = dec!(8);

        let mut conflict = agree.clone();
        conflict.volume_trend = VolumeTrend {
            ratio: dec!(1.5),
            direction: VolumeDirection::Rising,
        };
        conflict.momentum = dec!(-8);

        let a = score_set(&agree, &[], &RegimeState::insufficient());
        let c = score_set(&conflict, &[], &RegimeState::insufficient());
        assert!(c.reasoning.iter().any(|r| r == CONFLICT_REASON));
        assert!(c.confidence < a.confidence);
    }

    #[test]
    fn test_limited_history_noted_and_discounted() {
        let closes: Vec<Decimal> = (0..25).map(|i| Decimal::from(200 - i * 3)).collect();
        let signal = score_closes(&closes, dec!(0.5));
        assert!(signal.indicators.coverage() < Decimal::ONE);
        assert!(signal.reasoning.iter().any(|r| r.starts_with("Limited history")));
    }

    proptest! {
        #[test]
        fn prop_directional_signals_have_valid_stops(
            steps in proptest::collection::vec(-50i64..50, 30..120),
            spread in 0u32..5,
        ) {
            let mut price = 10_000i64;
            let closes: Vec<Decimal> = steps
                .iter()
                .map(|s| {
                    price = (price + s).max(1);
                    Decimal::from(price)
                })
                .collect();
            let signal = score_closes(&closes, Decimal::from(spread));

            prop_assert!(signal.confluence_score >= dec!(-100) && signal.confluence_score <= dec!(100));
            prop_assert!(signal.confidence >= dec!(5) && signal.confidence <= dec!(95));
            if signal.is_directional() {
                let stop = signal.stop_loss.unwrap();
                prop_assert!(stop != signal.entry_price);
                prop_assert!(signal.risk_reward_ratio > Decimal::ZERO);
            } else {
                prop_assert!(signal.stop_loss.is_none());
            }
        }
    }
}

//! Pattern recognition over the trailing candle window.
//!
//! Four families, each a free function so it can be tested in isolation:
//! - candlestick: doji, hammer, shooting star, engulfing (latest bars only)
//! - chart: double top / bottom and triangles from pivot highs / lows
//! - volume: spike against the rolling average
//! - fibonacci: proximity of the last close to a retracement level
//!
//! Detection never fails. An empty result is normal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::PatternParams;
use crate::types::{Candle, Pattern, PatternSignal, PatternType, Timeframe};

/// Retracement ratios checked for fibonacci proximity, with base confidence.
const FIB_LEVELS: [(Decimal, Decimal); 5] = [
    (dec!(0.236), dec!(0.55)),
    (dec!(0.382), dec!(0.7)),
    (dec!(0.5), dec!(0.7)),
    (dec!(0.618), dec!(0.8)),
    (dec!(0.786), dec!(0.6)),
];

/// Relative slope per bar below which a trendline counts as flat.
const FLAT_SLOPE: Decimal = dec!(0.0005);

/// Opposite wick must stay below this share of the range for hammer-type shapes.
const MAX_OPPOSITE_WICK: Decimal = dec!(0.2);

pub struct PatternRecognizer {
    params: PatternParams,
}

impl PatternRecognizer {
    pub fn new(params: PatternParams) -> Self {
        Self { params }
    }

    /// Detect all patterns in the trailing window of `candles`.
    pub fn detect(&self, candles: &[Candle]) -> Vec<Pattern> {
        let Some(last) = candles.last() else {
            return Vec::new();
        };
        let tf = last.timeframe;
        let window = &candles[candles.len().saturating_sub(self.params.window)..];

        let mut patterns = detect_candlestick(window, &self.params, tf);
        patterns.extend(detect_chart(window, &self.params, tf));
        patterns.extend(detect_volume_spike(window, &self.params, tf));
        patterns.extend(detect_fibonacci(window, &self.params, tf));
        patterns
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Candlestick
// ═══════════════════════════════════════════════════════════════════════════

/// Net close change over the `lookback` bars preceding index `idx`.
fn prior_trend(candles: &[Candle], idx: usize, lookback: usize) -> Option<Decimal> {
    if lookback == 0 || idx < lookback + 1 {
        return None;
    }
    Some(candles[idx - 1].close - candles[idx - 1 - lookback].close)
}

pub fn detect_candlestick(candles: &[Candle], params: &PatternParams, tf: Timeframe) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    let Some(idx) = candles.len().checked_sub(1) else {
        return patterns;
    };
    let c = &candles[idx];
    let body = c.body();
    let range = c.range();

    if range.is_zero() {
        return patterns;
    }

    // Doji
    let body_ratio = body / range;
    if body_ratio <= params.doji_body_ratio && !params.doji_body_ratio.is_zero() {
        let confidence =
            (Decimal::ONE - body_ratio / params.doji_body_ratio).clamp(dec!(0.5), dec!(0.95));
        patterns.push(Pattern::new(PatternType::Doji, PatternSignal::Neutral, confidence, tf));
    }

    // Hammer / shooting star need a real body and a prior trend to reverse.
    if !body.is_zero() && !params.wick_body_ratio.is_zero() {
        let trend = prior_trend(candles, idx, params.trend_lookback);
        let lower_ratio = c.lower_wick() / body;
        let upper_ratio = c.upper_wick() / body;

        if lower_ratio >= params.wick_body_ratio
            && c.upper_wick() / range < MAX_OPPOSITE_WICK
            && trend.is_some_and(|t| t < Decimal::ZERO)
        {
            patterns.push(
                Pattern::new(
                    PatternType::Hammer,
                    PatternSignal::Bullish,
                    shadow_confidence(lower_ratio, params.wick_body_ratio),
                    tf,
                )
                .with_level(c.low),
            );
        }

        if upper_ratio >= params.wick_body_ratio
            && c.lower_wick() / range < MAX_OPPOSITE_WICK
            && trend.is_some_and(|t| t > Decimal::ZERO)
        {
            patterns.push(
                Pattern::new(
                    PatternType::ShootingStar,
                    PatternSignal::Bearish,
                    shadow_confidence(upper_ratio, params.wick_body_ratio),
                    tf,
                )
                .with_level(c.high),
            );
        }
    }

    // Engulfing
    if idx >= 1 {
        let prev = &candles[idx - 1];
        let prev_body = prev.body();
        if !prev_body.is_zero() && body >= prev_body {
            let confidence = (dec!(0.5) + body / prev_body * dec!(0.1)).min(dec!(0.9));
            if prev.is_bearish() && c.is_bullish() && c.open <= prev.close && c.close >= prev.open {
                patterns.push(Pattern::new(
                    PatternType::BullishEngulfing,
                    PatternSignal::Bullish,
                    confidence,
                    tf,
                ));
            }
            if prev.is_bullish() && c.is_bearish() && c.open >= prev.close && c.close <= prev.open {
                patterns.push(Pattern::new(
                    PatternType::BearishEngulfing,
                    PatternSignal::Bearish,
                    confidence,
                    tf,
                ));
            }
        }
    }

    patterns
}

fn shadow_confidence(ratio: Decimal, threshold: Decimal) -> Decimal {
    (dec!(0.5) + (ratio / threshold - Decimal::ONE) * dec!(0.2)).clamp(dec!(0.5), dec!(0.9))
}

// ═══════════════════════════════════════════════════════════════════════════
// Chart
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pivot {
    pub index: usize,
    pub price: Decimal,
}

/// Pivot highs and lows.
///
/// A bar is a pivot high when its high is strictly above the `strength` bars
/// before it and not below the `strength` bars after it (lows mirrored), so
/// flat runs produce no pivots.
pub fn find_pivots(candles: &[Candle], strength: usize) -> (Vec<Pivot>, Vec<Pivot>) {
    let mut peaks = Vec::new();
    let mut valleys = Vec::new();
    if strength == 0 || candles.len() < 2 * strength + 1 {
        return (peaks, valleys);
    }

    for i in strength..candles.len() - strength {
        let left = &candles[i - strength..i];
        let right = &candles[i + 1..=i + strength];
        let c = &candles[i];

        if left.iter().all(|k| k.high < c.high) && right.iter().all(|k| k.high <= c.high) {
            peaks.push(Pivot {
                index: i,
                price: c.high,
            });
        }
        if left.iter().all(|k| k.low > c.low) && right.iter().all(|k| k.low >= c.low) {
            valleys.push(Pivot {
                index: i,
                price: c.low,
            });
        }
    }

    (peaks, valleys)
}

pub fn detect_chart(candles: &[Candle], params: &PatternParams, tf: Timeframe) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    let Some(last) = candles.last() else {
        return patterns;
    };
    let (peaks, valleys) = find_pivots(candles, params.pivot_strength);

    if let Some(p) = double_extreme(&peaks, &valleys, params.double_tolerance, true) {
        // Only meaningful once price has turned away from the second peak.
        if last.close < p.1 {
            patterns.push(
                Pattern::new(PatternType::DoubleTop, PatternSignal::Bearish, p.0, tf).with_level(p.2),
            );
        }
    }
    if let Some(p) = double_extreme(&valleys, &peaks, params.double_tolerance, false) {
        if last.close > p.1 {
            patterns.push(
                Pattern::new(PatternType::DoubleBottom, PatternSignal::Bullish, p.0, tf)
                    .with_level(p.2),
            );
        }
    }

    if let Some(p) = triangle(&peaks, &valleys, tf) {
        patterns.push(p);
    }

    patterns
}

/// Latest two extremes of similar price separated by a meaningful opposite
/// pivot. Returns `(confidence, second extreme, neckline)`.
fn double_extreme(
    extremes: &[Pivot],
    opposite: &[Pivot],
    tolerance: Decimal,
    is_top: bool,
) -> Option<(Decimal, Decimal, Decimal)> {
    if extremes.len() < 2 || tolerance.is_zero() {
        return None;
    }
    let first = extremes[extremes.len() - 2];
    let second = extremes[extremes.len() - 1];
    let avg = (first.price + second.price) / dec!(2);
    if avg.is_zero() {
        return None;
    }
    let diff = (first.price - second.price).abs() / avg;
    if diff > tolerance {
        return None;
    }

    let between = opposite
        .iter()
        .filter(|p| p.index > first.index && p.index < second.index);
    let neckline = if is_top {
        between.map(|p| p.price).min()?
    } else {
        between.map(|p| p.price).max()?
    };

    let depth = (avg - neckline).abs() / avg;
    if depth <= tolerance {
        return None;
    }

    let confidence = dec!(0.75) - diff / tolerance * dec!(0.15);
    Some((confidence, second.price, neckline))
}

/// Converging trendlines through the last two pivot highs and lows.
fn triangle(peaks: &[Pivot], valleys: &[Pivot], tf: Timeframe) -> Option<Pattern> {
    if peaks.len() < 2 || valleys.len() < 2 {
        return None;
    }
    let peak_slope = relative_slope(peaks[peaks.len() - 2], peaks[peaks.len() - 1])?;
    let valley_slope = relative_slope(valleys[valleys.len() - 2], valleys[valleys.len() - 1])?;

    let flat = |s: Decimal| s.abs() < FLAT_SLOPE;

    let (pattern_type, signal, confidence) = if flat(peak_slope) && valley_slope >= FLAT_SLOPE {
        (PatternType::AscendingTriangle, PatternSignal::Bullish, dec!(0.7))
    } else if flat(valley_slope) && peak_slope <= -FLAT_SLOPE {
        (PatternType::DescendingTriangle, PatternSignal::Bearish, dec!(0.7))
    } else if peak_slope <= -FLAT_SLOPE && valley_slope >= FLAT_SLOPE {
        (PatternType::SymmetricalTriangle, PatternSignal::Neutral, dec!(0.65))
    } else {
        return None;
    };

    Some(Pattern::new(pattern_type, signal, confidence, tf).with_level(peaks[peaks.len() - 1].price))
}

/// Slope between two pivots per bar, relative to their mean price.
fn relative_slope(a: Pivot, b: Pivot) -> Option<Decimal> {
    let bars = Decimal::from(b.index.checked_sub(a.index)? as u64);
    let mid = (a.price + b.price) / dec!(2);
    if bars.is_zero() || mid.is_zero() {
        return None;
    }
    Some((b.price - a.price) / bars / mid)
}

// ═══════════════════════════════════════════════════════════════════════════
// Volume
// ═══════════════════════════════════════════════════════════════════════════

pub fn detect_volume_spike(candles: &[Candle], params: &PatternParams, tf: Timeframe) -> Vec<Pattern> {
    let period = params.volume_average_period;
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return Vec::new();
    }

    let last = &candles[n - 1];
    let avg = candles[n - 1 - period..n - 1]
        .iter()
        .map(|c| c.volume)
        .sum::<Decimal>()
        / Decimal::from(period as u64);
    if avg.is_zero() || last.volume < avg * params.volume_spike_multiplier {
        return Vec::new();
    }

    let ratio = last.volume / avg;
    let signal = if last.is_bullish() {
        PatternSignal::Bullish
    } else if last.is_bearish() {
        PatternSignal::Bearish
    } else {
        PatternSignal::Neutral
    };
    let confidence = (ratio / (params.volume_spike_multiplier * dec!(2))).clamp(dec!(0.5), dec!(0.95));

    vec![Pattern::new(PatternType::VolumeSpike, signal, confidence, tf).with_level(last.close)]
}

// ═══════════════════════════════════════════════════════════════════════════
// Fibonacci
// ═══════════════════════════════════════════════════════════════════════════

pub fn detect_fibonacci(candles: &[Candle], params: &PatternParams, tf: Timeframe) -> Vec<Pattern> {
    if candles.len() < 5 || params.fib_tolerance.is_zero() {
        return Vec::new();
    }

    let (high_idx, swing_high) = candles
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.high))
        .max_by(|a, b| a.1.cmp(&b.1))
        .unwrap_or((0, Decimal::ZERO));
    let (low_idx, swing_low) = candles
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.low))
        .min_by(|a, b| a.1.cmp(&b.1))
        .unwrap_or((0, Decimal::ZERO));

    let range = swing_high - swing_low;
    let close = candles[candles.len() - 1].close;
    if range <= Decimal::ZERO || close <= Decimal::ZERO {
        return Vec::new();
    }

    // Up-swing retraces down from the high; down-swing retraces up from the low.
    let up_swing = low_idx < high_idx;
    let best = FIB_LEVELS
        .iter()
        .map(|&(ratio, base)| {
            let level = if up_swing {
                swing_high - range * ratio
            } else {
                swing_low + range * ratio
            };
            let distance = (close - level).abs() / close;
            (level, base, distance)
        })
        .filter(|&(_, _, distance)| distance <= params.fib_tolerance)
        .min_by(|a, b| a.2.cmp(&b.2));

    let Some((level, base, distance)) = best else {
        return Vec::new();
    };

    let confidence = base * (Decimal::ONE - distance / params.fib_tolerance * dec!(0.5));
    let signal = if up_swing {
        PatternSignal::Bullish
    } else {
        PatternSignal::Bearish
    };
    vec![Pattern::new(PatternType::FibonacciRetracement, signal, confidence, tf).with_level(level)]
}

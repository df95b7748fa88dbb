//! Technical indicators over a candle history.
//!
//! All values are `Decimal`. The smoothed indicators (RSI, MACD, ATR) are
//! built on small streaming state machines; the free functions feed a fresh
//! state over the whole history, and [`IndicatorCalculator`] keeps the states
//! per (symbol, timeframe) so a history that only grew by a few candles is not
//! replayed from the start. Both paths produce identical output.
//!
//! Indicators implemented:
//! - Wilder-smoothed: RSI, ATR, ADX
//! - EMA based: MACD line / signal / histogram
//! - Window based: Bollinger Bands, Stochastic %K/%D, SMA cross, volume
//!   trend, momentum (rate of change), support / resistance
//!
//! Reference: Wilder (1978), "New Concepts in Technical Trading Systems".

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::trace;

use crate::config::IndicatorParams;
use crate::types::{
    BollingerBands, Candle, CrossState, IndicatorKind, IndicatorSet, MacdValues, PairKey,
    SmaCross, StochasticValues, VolumeDirection, VolumeTrend,
};

const VOLUME_RISING_RATIO: Decimal = dec!(1.2);
const VOLUME_FALLING_RATIO: Decimal = dec!(0.8);

// ═══════════════════════════════════════════════════════════════════════════
// Streaming state
// ═══════════════════════════════════════════════════════════════════════════

/// Exponential moving average seeded with the SMA of the first `period`
/// values. Multiplier `k = 2 / (period + 1)`.
#[derive(Debug, Clone)]
pub struct EmaState {
    period: usize,
    k: Decimal,
    count: usize,
    seed_sum: Decimal,
    value: Option<Decimal>,
}

impl EmaState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            k: dec!(2) / Decimal::from(period as u64 + 1),
            count: 0,
            seed_sum: Decimal::ZERO,
            value: None,
        }
    }

    pub fn update(&mut self, x: Decimal) {
        if self.period == 0 {
            return;
        }
        self.count += 1;
        match self.value {
            None => {
                self.seed_sum += x;
                if self.count == self.period {
                    self.value = Some(self.seed_sum / Decimal::from(self.period as u64));
                }
            }
            Some(prev) => {
                self.value = Some(x * self.k + prev * (Decimal::ONE - self.k));
            }
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// Wilder-smoothed RSI.
///
/// Initial averages are the simple mean of the first `period` gains/losses,
/// then `avg = (avg * (n - 1) + new) / n`.
#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev: Option<Decimal>,
    changes: usize,
    gain_sum: Decimal,
    loss_sum: Decimal,
    avg: Option<(Decimal, Decimal)>,
}

impl RsiState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            changes: 0,
            gain_sum: Decimal::ZERO,
            loss_sum: Decimal::ZERO,
            avg: None,
        }
    }

    pub fn update(&mut self, price: Decimal) {
        let Some(prev) = self.prev.replace(price) else {
            return;
        };
        if self.period == 0 {
            return;
        }

        let change = price - prev;
        let gain = change.max(Decimal::ZERO);
        let loss = (-change).max(Decimal::ZERO);
        let period_d = Decimal::from(self.period as u64);
        self.changes += 1;

        match self.avg {
            None => {
                self.gain_sum += gain;
                self.loss_sum += loss;
                if self.changes == self.period {
                    self.avg = Some((self.gain_sum / period_d, self.loss_sum / period_d));
                }
            }
            Some((avg_gain, avg_loss)) => {
                let period_m1 = Decimal::from(self.period as u64 - 1);
                self.avg = Some((
                    (avg_gain * period_m1 + gain) / period_d,
                    (avg_loss * period_m1 + loss) / period_d,
                ));
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.avg.is_some()
    }

    /// RSI in [0, 100]; 50 before the first full period, 100 when the
    /// average loss is zero.
    pub fn value(&self) -> Decimal {
        match self.avg {
            None => dec!(50),
            Some((_, avg_loss)) if avg_loss.is_zero() => dec!(100),
            Some((avg_gain, avg_loss)) => {
                let rs = avg_gain / avg_loss;
                (dec!(100) - dec!(100) / (Decimal::ONE + rs)).clamp(Decimal::ZERO, dec!(100))
            }
        }
    }
}

/// MACD line = EMA(fast) − EMA(slow); signal = EMA(signal) of the line.
#[derive(Debug, Clone)]
pub struct MacdState {
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
    line: Option<Decimal>,
}

impl MacdState {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: EmaState::new(fast),
            slow: EmaState::new(slow),
            signal: EmaState::new(signal),
            line: None,
        }
    }

    pub fn update(&mut self, close: Decimal) {
        self.fast.update(close);
        self.slow.update(close);
        if let (Some(f), Some(s)) = (self.fast.value(), self.slow.value()) {
            let line = f - s;
            self.line = Some(line);
            self.signal.update(line);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.signal.value().is_some()
    }

    /// Zeroes until the signal EMA has a value. `histogram == line - signal`.
    pub fn values(&self) -> MacdValues {
        match (self.line, self.signal.value()) {
            (Some(line), Some(signal)) => MacdValues {
                line,
                signal,
                histogram: line - signal,
            },
            _ => MacdValues::default(),
        }
    }
}

/// Wilder-smoothed average true range.
///
/// `TR = max(H-L, |H-prevC|, |L-prevC|)`; first ATR is the mean of the first
/// `period` true ranges.
#[derive(Debug, Clone)]
pub struct AtrState {
    period: usize,
    prev_close: Option<Decimal>,
    count: usize,
    tr_sum: Decimal,
    value: Option<Decimal>,
}

impl AtrState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            count: 0,
            tr_sum: Decimal::ZERO,
            value: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) {
        if let (Some(prev_close), true) = (self.prev_close, self.period > 0) {
            let tr = true_range(high, low, prev_close);
            let period_d = Decimal::from(self.period as u64);
            self.count += 1;
            match self.value {
                None => {
                    self.tr_sum += tr;
                    if self.count == self.period {
                        self.value = Some(self.tr_sum / period_d);
                    }
                }
                Some(prev) => {
                    let period_m1 = Decimal::from(self.period as u64 - 1);
                    self.value = Some((prev * period_m1 + tr) / period_d);
                }
            }
        }
        self.prev_close = Some(close);
    }

    pub fn value(&self) -> Decimal {
        self.value.unwrap_or(Decimal::ZERO)
    }
}

fn true_range(high: Decimal, low: Decimal, prev_close: Decimal) -> Decimal {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Streaming states for one candle history.
#[derive(Debug, Clone)]
struct StreamState {
    rsi: RsiState,
    macd: MacdState,
    atr: AtrState,
    first_timestamp: i64,
    last_candle: Option<Candle>,
    consumed: usize,
}

impl StreamState {
    fn new(params: &IndicatorParams, first_timestamp: i64) -> Self {
        Self {
            rsi: RsiState::new(params.rsi_period),
            macd: MacdState::new(params.macd_fast, params.macd_slow, params.macd_signal),
            atr: AtrState::new(params.atr_period),
            first_timestamp,
            last_candle: None,
            consumed: 0,
        }
    }

    fn feed(&mut self, candles: &[Candle]) {
        for c in candles {
            self.rsi.update(c.close);
            self.macd.update(c.close);
            self.atr.update(c.high, c.low, c.close);
        }
        if let Some(last) = candles.last() {
            self.last_candle = Some(last.clone());
        }
        self.consumed += candles.len();
    }

    /// True when `candles` starts with exactly the history this state was
    /// built from.
    fn extends(&self, candles: &[Candle]) -> bool {
        if candles.is_empty()
            || candles[0].timestamp != self.first_timestamp
            || self.consumed == 0
            || self.consumed > candles.len()
        {
            return false;
        }
        self.last_candle.as_ref() == Some(&candles[self.consumed - 1])
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Calculator
// ═══════════════════════════════════════════════════════════════════════════

/// Computes [`IndicatorSet`]s, carrying smoothed-indicator state per
/// (symbol, timeframe) between cycles.
pub struct IndicatorCalculator {
    params: IndicatorParams,
    states: Mutex<HashMap<PairKey, StreamState>>,
}

impl IndicatorCalculator {
    pub fn new(params: IndicatorParams) -> Self {
        Self {
            params,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Compute every indicator for `candles` (oldest first).
    ///
    /// Never fails: indicators without enough history take their neutral
    /// default and are listed in [`IndicatorSet::unavailable`].
    pub fn compute(&self, candles: &[Candle]) -> IndicatorSet {
        let Some(first) = candles.first() else {
            return IndicatorSet::default();
        };
        let key = PairKey::new(first.symbol.clone(), first.timeframe);

        // Take the state out so a concurrent compute for the same key simply
        // rebuilds instead of contending on the map.
        let cached = self.states.lock().remove(&key);
        let state = match cached {
            Some(mut state) if state.extends(candles) => {
                let from = state.consumed;
                trace!(pair = %key, reused = from, new = candles.len() - from, "extending indicator state");
                state.feed(&candles[from..]);
                state
            }
            _ => {
                let mut state = StreamState::new(&self.params, first.timestamp);
                state.feed(candles);
                state
            }
        };

        let set = assemble(candles, &self.params, &state);
        self.states.lock().insert(key, state);
        set
    }

    /// Drop carried state for a pair.
    pub fn reset(&self, key: &PairKey) {
        self.states.lock().remove(key);
    }
}

/// Pure computation of every indicator from scratch.
pub fn compute_indicators(candles: &[Candle], params: &IndicatorParams) -> IndicatorSet {
    let Some(first) = candles.first() else {
        return IndicatorSet::default();
    };
    let mut state = StreamState::new(params, first.timestamp);
    state.feed(candles);
    assemble(candles, params, &state)
}

fn assemble(candles: &[Candle], params: &IndicatorParams, state: &StreamState) -> IndicatorSet {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let highs: Vec<Decimal> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<Decimal> = candles.iter().map(|c| c.low).collect();
    let volumes: Vec<Decimal> = candles.iter().map(|c| c.volume).collect();
    let n = candles.len();

    let mut unavailable = Vec::new();

    if !state.rsi.is_ready() {
        unavailable.push(IndicatorKind::Rsi);
    }
    if !state.macd.is_ready() {
        unavailable.push(IndicatorKind::Macd);
    }

    let (upper, middle, lower) = bollinger_bands(&closes, params.bb_period, params.bb_std);
    if n < params.bb_period {
        unavailable.push(IndicatorKind::Bollinger);
    }

    let stochastic = match stochastic(
        &highs,
        &lows,
        &closes,
        params.stoch_k_period,
        params.stoch_d_period,
    ) {
        Some((k, d)) => StochasticValues { k, d },
        None => {
            unavailable.push(IndicatorKind::Stochastic);
            StochasticValues {
                k: dec!(50),
                d: dec!(50),
            }
        }
    };

    let sma_cross = sma_cross(&closes, params.sma_fast, params.sma_slow);
    if n < params.sma_slow {
        unavailable.push(IndicatorKind::SmaCross);
    }

    let momentum = momentum(&closes, params.momentum_period).unwrap_or_else(|| {
        unavailable.push(IndicatorKind::Momentum);
        Decimal::ZERO
    });

    let volume_trend = volume_trend(&volumes, params.volume_short, params.volume_long)
        .unwrap_or_else(|| {
            unavailable.push(IndicatorKind::Volume);
            VolumeTrend {
                ratio: Decimal::ONE,
                direction: VolumeDirection::Flat,
            }
        });

    let (support, resistance) =
        support_resistance(&highs, &lows, params.support_resistance_lookback);
    if n < params.support_resistance_lookback {
        unavailable.push(IndicatorKind::SupportResistance);
    }

    IndicatorSet {
        price: closes.last().copied().unwrap_or(Decimal::ZERO),
        rsi: state.rsi.value(),
        macd: state.macd.values(),
        bollinger: BollingerBands {
            upper,
            middle,
            lower,
        },
        atr: state.atr.value(),
        stochastic,
        sma_cross,
        volume_trend,
        momentum,
        support,
        resistance,
        adx: adx(&highs, &lows, &closes, params.adx_period),
        candle_count: n,
        unavailable,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Pure indicator functions
// ═══════════════════════════════════════════════════════════════════════════

/// Relative Strength Index (Wilder's smoothing). Returns 50 if insufficient
/// data.
pub fn rsi(prices: &[Decimal], period: usize) -> Decimal {
    let mut state = RsiState::new(period);
    for &p in prices {
        state.update(p);
    }
    state.value()
}

/// Moving Average Convergence Divergence. Zeroes if insufficient data.
pub fn macd(prices: &[Decimal], fast: usize, slow: usize, signal: usize) -> MacdValues {
    let mut state = MacdState::new(fast, slow, signal);
    for &p in prices {
        state.update(p);
    }
    state.values()
}

/// Average True Range (Wilder's smoothing). Zero on mismatched or
/// insufficient data.
pub fn atr(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> Decimal {
    let n = highs.len();
    if lows.len() != n || closes.len() != n {
        return Decimal::ZERO;
    }
    let mut state = AtrState::new(period);
    for i in 0..n {
        state.update(highs[i], lows[i], closes[i]);
    }
    state.value()
}

/// Simple moving average of the last `period` values.
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().copied().sum::<Decimal>() / Decimal::from(period as u64))
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        Decimal::ZERO
    } else {
        values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
    }
}

/// Bollinger Bands (SMA with population standard deviation).
///
/// Returns `(upper, middle, lower)`. With fewer than `period` prices all three
/// collapse to the mean of what is available (zero when empty).
pub fn bollinger_bands(
    prices: &[Decimal],
    period: usize,
    std_mult: Decimal,
) -> (Decimal, Decimal, Decimal) {
    if prices.len() < period || period == 0 {
        let m = mean(prices);
        return (m, m, m);
    }

    let window = &prices[prices.len() - period..];
    let period_d = Decimal::from(period as u64);
    let middle: Decimal = window.iter().copied().sum::<Decimal>() / period_d;

    let variance: Decimal = window
        .iter()
        .map(|&p| {
            let diff = p - middle;
            diff * diff
        })
        .sum::<Decimal>()
        / period_d;

    let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
    (middle + std_mult * std_dev, middle, middle - std_mult * std_dev)
}

/// Stochastic oscillator `(%K, %D)`.
///
/// %K is the close's position in the `k_period` high/low range (50 when the
/// range is flat); %D is the SMA of the last `d_period` %K values, or %K
/// itself while fewer are available. `None` with fewer than `k_period` bars.
pub fn stochastic(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    k_period: usize,
    d_period: usize,
) -> Option<(Decimal, Decimal)> {
    let n = closes.len();
    if k_period == 0 || n < k_period || highs.len() != n || lows.len() != n {
        return None;
    }

    let percent_k = |t: usize| -> Decimal {
        let start = t + 1 - k_period;
        let hh = highs[start..=t].iter().copied().max().unwrap_or(Decimal::ZERO);
        let ll = lows[start..=t].iter().copied().min().unwrap_or(Decimal::ZERO);
        if hh == ll {
            dec!(50)
        } else {
            ((closes[t] - ll) / (hh - ll) * dec!(100)).clamp(Decimal::ZERO, dec!(100))
        }
    };

    let first_t = (k_period - 1).max(n.saturating_sub(d_period.max(1)));
    let ks: Vec<Decimal> = (first_t..n).map(percent_k).collect();
    let k = *ks.last()?;
    let d = if ks.len() < d_period { k } else { mean(&ks) };
    Some((k, d))
}

/// Fast/slow SMA relationship on the latest bar.
pub fn sma_cross(closes: &[Decimal], fast: usize, slow: usize) -> SmaCross {
    let (Some(f), Some(s)) = (sma(closes, fast), sma(closes, slow)) else {
        return SmaCross {
            fast: sma(closes, fast).unwrap_or(Decimal::ZERO),
            slow: Decimal::ZERO,
            state: CrossState::Neutral,
        };
    };

    let prev = &closes[..closes.len() - 1];
    let state = match (sma(prev, fast), sma(prev, slow)) {
        (Some(pf), Some(ps)) if pf <= ps && f > s => CrossState::GoldenCross,
        (Some(pf), Some(ps)) if pf >= ps && f < s => CrossState::DeathCross,
        _ if f > s => CrossState::Above,
        _ if f < s => CrossState::Below,
        _ => CrossState::Neutral,
    };

    SmaCross {
        fast: f,
        slow: s,
        state,
    }
}

/// Rate of change over `period` bars, in percent.
pub fn momentum(closes: &[Decimal], period: usize) -> Option<Decimal> {
    let n = closes.len();
    if period == 0 || n <= period {
        return None;
    }
    let base = closes[n - 1 - period];
    if base.is_zero() {
        return None;
    }
    Some((closes[n - 1] - base) / base * dec!(100))
}

/// Short vs long average volume. `None` with fewer than `long` bars.
pub fn volume_trend(volumes: &[Decimal], short: usize, long: usize) -> Option<VolumeTrend> {
    let long_avg = sma(volumes, long)?;
    let short_avg = sma(volumes, short)?;
    let ratio = if long_avg.is_zero() {
        Decimal::ONE
    } else {
        short_avg / long_avg
    };
    let direction = if ratio > VOLUME_RISING_RATIO {
        VolumeDirection::Rising
    } else if ratio < VOLUME_FALLING_RATIO {
        VolumeDirection::Falling
    } else {
        VolumeDirection::Flat
    };
    Some(VolumeTrend { ratio, direction })
}

/// Lowest low and highest high over the last `lookback` bars (or all bars
/// when fewer). Zeroes when empty.
pub fn support_resistance(
    highs: &[Decimal],
    lows: &[Decimal],
    lookback: usize,
) -> (Decimal, Decimal) {
    let start_h = highs.len().saturating_sub(lookback);
    let start_l = lows.len().saturating_sub(lookback);
    let support = lows[start_l..].iter().copied().min().unwrap_or(Decimal::ZERO);
    let resistance = highs[start_h..].iter().copied().max().unwrap_or(Decimal::ZERO);
    (support, resistance)
}

/// Average Directional Index (Wilder). Zero with fewer than `2 * period` bars.
pub fn adx(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> Decimal {
    let n = closes.len();
    if period == 0 || n < 2 * period || highs.len() != n || lows.len() != n {
        return Decimal::ZERO;
    }

    let period_d = Decimal::from(period as u64);
    let mut tr_s = Decimal::ZERO;
    let mut plus_s = Decimal::ZERO;
    let mut minus_s = Decimal::ZERO;
    let mut dx_values: Vec<Decimal> = Vec::new();
    let mut adx_val: Option<Decimal> = None;

    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        let plus_dm = if up > down && up > Decimal::ZERO { up } else { Decimal::ZERO };
        let minus_dm = if down > up && down > Decimal::ZERO { down } else { Decimal::ZERO };
        let tr = true_range(highs[i], lows[i], closes[i - 1]);

        if i <= period {
            tr_s += tr;
            plus_s += plus_dm;
            minus_s += minus_dm;
            if i < period {
                continue;
            }
        } else {
            tr_s = tr_s - tr_s / period_d + tr;
            plus_s = plus_s - plus_s / period_d + plus_dm;
            minus_s = minus_s - minus_s / period_d + minus_dm;
        }

        let dx = if tr_s.is_zero() {
            Decimal::ZERO
        } else {
            let plus_di = plus_s / tr_s * dec!(100);
            let minus_di = minus_s / tr_s * dec!(100);
            let sum = plus_di + minus_di;
            if sum.is_zero() {
                Decimal::ZERO
            } else {
                (plus_di - minus_di).abs() / sum * dec!(100)
            }
        };

        match adx_val {
            Some(prev) => {
                adx_val = Some((prev * (period_d - Decimal::ONE) + dx) / period_d);
            }
            None => {
                dx_values.push(dx);
                if dx_values.len() == period {
                    adx_val = Some(mean(&dx_values));
                }
            }
        }
    }

    adx_val.unwrap_or(Decimal::ZERO)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

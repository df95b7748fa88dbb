//! Market regime classification from indicators plus raw closes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::trace;

use crate::config::RegimeParams;
use crate::core::indicators::sma;
use crate::types::{Candle, IndicatorSet, MarketRegime, RegimeState};

pub struct RegimeDetector {
    params: RegimeParams,
}

impl RegimeDetector {
    pub fn new(params: RegimeParams) -> Self {
        Self { params }
    }

    /// Classify the regime.
    ///
    /// Volatility is checked first and wins over any trend. Trend needs both
    /// a steep enough SMA slope and ADX at or above the threshold. Everything
    /// else is SIDEWAYS.
    pub fn classify(&self, indicators: &IndicatorSet, candles: &[Candle]) -> RegimeState {
        let p = &self.params;
        let price = indicators.price;

        if candles.len() < p.min_candles || price <= Decimal::ZERO {
            return RegimeState::insufficient();
        }

        let volatility_ratio = indicators.atr / price;
        let trend_slope = self.sma_slope(candles).unwrap_or(Decimal::ZERO);

        let (regime, confidence) = if volatility_ratio > p.volatile_atr_ratio {
            let excess = volatility_ratio / p.volatile_atr_ratio - Decimal::ONE;
            (
                MarketRegime::Volatile,
                (dec!(0.5) + excess * dec!(0.25)).clamp(dec!(0.5), dec!(0.95)),
            )
        } else if indicators.adx >= p.trend_adx_threshold
            && trend_slope.abs() > p.slope_threshold
        {
            let regime = if trend_slope > Decimal::ZERO {
                MarketRegime::Bull
            } else {
                MarketRegime::Bear
            };
            let adx_excess = (indicators.adx - p.trend_adx_threshold) / dec!(50);
            let slope_excess = (trend_slope.abs() / p.slope_threshold - Decimal::ONE) * dec!(0.05);
            (
                regime,
                (dec!(0.5) + adx_excess + slope_excess).clamp(dec!(0.5), dec!(0.95)),
            )
        } else {
            // Weak ADX makes ranging more certain.
            let trendiness = if p.trend_adx_threshold.is_zero() {
                Decimal::ONE
            } else {
                indicators.adx / p.trend_adx_threshold
            };
            (
                MarketRegime::Sideways,
                (dec!(0.7) - trendiness * dec!(0.3)).clamp(dec!(0.3), dec!(0.7)),
            )
        };

        trace!(
            %regime,
            %confidence,
            %trend_slope,
            %volatility_ratio,
            adx = %indicators.adx,
            "regime classified"
        );

        RegimeState {
            regime,
            confidence,
            trend_slope,
            volatility_ratio,
        }
    }

    /// Relative per-bar slope of the SMA over the last `slope_lookback` bars.
    fn sma_slope(&self, candles: &[Candle]) -> Option<Decimal> {
        let p = &self.params;
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let n = closes.len();
        let earlier = n.checked_sub(p.slope_lookback)?;

        let now = sma(&closes, p.sma_period)?;
        let before = sma(&closes[..earlier], p.sma_period)?;
        if before.is_zero() || p.slope_lookback == 0 {
            return None;
        }
        Some((now - before) / Decimal::from(p.slope_lookback as u64) / before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorParams;
    use crate::core::indicators::compute_indicators;
    use crate::core::indicators::tests::candles_from_closes;

    fn classify(closes: &[Decimal], spread: Decimal) -> RegimeState {
        let candles = candles_from_closes(closes, spread);
        let set = compute_indicators(&candles, &IndicatorParams::default());
        RegimeDetector::new(RegimeParams::default()).classify(&set, &candles)
    }

    #[test]
    fn test_insufficient_history_is_low_confidence_sideways() {
        let state = classify(&vec![dec!(100); 10], Decimal::ZERO);
        assert_eq!(state.regime, MarketRegime::Sideways);
        assert!(state.confidence <= dec!(0.3));
    }

    #[test]
    fn test_empty_history_is_sideways() {
        let state = RegimeDetector::new(RegimeParams::default()).classify(&IndicatorSet::default(), &[]);
        assert_eq!(state, RegimeState::insufficient());
    }

    #[test]
    fn test_flat_series_is_sideways() {
        let closes = vec![dec!(250); 30];
        let state = classify(&closes, Decimal::ZERO);
        assert_eq!(state.regime, MarketRegime::Sideways);
        assert_eq!(state.volatility_ratio, Decimal::ZERO);
        assert_eq!(state.trend_slope, Decimal::ZERO);
    }

    #[test]
    fn test_steady_uptrend_is_bull() {
        let closes: Vec<Decimal> = (0..80).map(|i| Decimal::from(1000 + i * 5)).collect();
        let state = classify(&closes, dec!(1));
        assert_eq!(state.regime, MarketRegime::Bull, "{state:?}");
        assert!(state.trend_slope > Decimal::ZERO);
        assert!(state.confidence >= dec!(0.5));
    }

    #[test]
    fn test_steady_downtrend_is_bear() {
        let closes: Vec<Decimal> = (0..80).map(|i| Decimal::from(2000 - i * 10)).collect();
        let state = classify(&closes, dec!(1));
        assert_eq!(state.regime, MarketRegime::Bear, "{state:?}");
    }

    #[test]
    fn test_wide_ranges_are_volatile_regardless_of_trend() {
        let closes: Vec<Decimal> = (0..80).map(|i| Decimal::from(1000 + i * 5)).collect();
        // Spread of 40 on a ~1300 price puts ATR/price well above 3%.
        let state = classify(&closes, dec!(40));
        assert_eq!(state.regime, MarketRegime::Volatile);
        assert!(state.volatility_ratio > dec!(0.03));
    }

    #[test]
    fn test_non_positive_price_is_insufficient() {
        let candles = candles_from_closes(&vec![dec!(100); 40], Decimal::ZERO);
        let mut set = compute_indicators(&candles, &IndicatorParams::default());
        set.price = Decimal::ZERO;
        let state = RegimeDetector::new(RegimeParams::default()).classify(&set, &candles);
        assert_eq!(state, RegimeState::insufficient());
    }
}

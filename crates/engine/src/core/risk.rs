//! Monte Carlo risk assessment for published signals.
//!
//! Sampling runs in `f64`; results are converted to `Decimal` at the
//! boundary. All returns are fractions of entry in the signal's favour
//! (positive = profit for either direction).

use lru::LruCache;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::errors::EngineError;
use crate::types::{Direction, ReturnDistribution, RiskAssessment, Signal};

/// Decimal places kept when converting simulation output.
const OUTPUT_DP: u32 = 8;

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Simulate `iterations` trade outcomes for `signal`.
    ///
    /// Rejects NEUTRAL signals, missing or degenerate stop / target, and
    /// iteration counts outside `1..=max_iterations`.
    pub fn assess(&self, signal: &Signal, iterations: usize) -> Result<RiskAssessment, EngineError> {
        let cfg = &self.config;

        if iterations == 0 || iterations > cfg.max_iterations {
            return Err(EngineError::invalid(format!(
                "iterations must be in 1..={}, got {iterations}",
                cfg.max_iterations
            )));
        }
        if signal.direction == Direction::Neutral {
            return Err(EngineError::invalid("cannot assess risk of a NEUTRAL signal"));
        }
        let (Some(stop), Some(target)) = (signal.stop_loss, signal.take_profit) else {
            return Err(EngineError::invalid("signal has no stop-loss / take-profit"));
        };

        let entry = to_f64(signal.entry_price);
        if entry <= 0.0 {
            return Err(EngineError::invalid("entry price must be positive"));
        }
        let risk = (entry - to_f64(stop)).abs() / entry;
        let reward = (to_f64(target) - entry).abs() / entry;
        if risk == 0.0 || reward == 0.0 {
            return Err(EngineError::invalid("stop-loss and take-profit must differ from entry"));
        }

        let p = (to_f64(signal.confidence) / 100.0).clamp(0.0, 1.0);
        let holding = f64::from(signal.timeframe.holding_bars());
        let atr = to_f64(signal.indicators.atr);

        // Direction-consistent drift, ATR-implied spread over the horizon.
        let mu = p * reward - (1.0 - p) * risk;
        let sigma = if atr > 0.0 {
            atr / entry * holding.sqrt()
        } else {
            risk
        };

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut samples: Vec<f64> = Vec::with_capacity(iterations);
        while samples.len() < iterations {
            let (z0, z1) = box_muller(&mut rng);
            samples.push((mu + sigma * z0).clamp(-risk, reward));
            if samples.len() < iterations {
                samples.push((mu + sigma * z1).clamp(-risk, reward));
            }
        }
        samples.sort_by(f64::total_cmp);

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let std_dev = (samples.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
        let volatility = std_dev * (signal.timeframe.bars_per_year() / holding).sqrt();

        let var95 = percentile(&samples, 0.05);
        let tail: Vec<f64> = samples.iter().copied().filter(|r| *r <= var95).collect();
        let cvar95 = if tail.is_empty() {
            var95
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        };

        let win_probability = samples.iter().filter(|r| **r > 0.0).count() as f64 / n;
        let sharpe = if volatility > 0.0 { mean / volatility } else { 0.0 };

        let payoff = reward / risk;
        let cap = to_f64(cfg.max_position_cap);
        let kelly = (win_probability - (1.0 - win_probability) / payoff).clamp(0.0, cap);
        let kelly_fraction = to_decimal(kelly);
        let recommended_position_size =
            (cfg.account_equity * kelly_fraction * cfg.kelly_multiplier).round_dp(2);

        debug!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            iterations,
            mean,
            win_probability,
            kelly,
            "monte carlo complete"
        );

        Ok(RiskAssessment {
            signal_id: signal.id,
            direction: signal.direction,
            iterations,
            expected_return: to_decimal(mean),
            volatility: to_decimal(volatility),
            var95: to_decimal(var95),
            cvar95: to_decimal(cvar95),
            max_drawdown: to_decimal(samples[0]),
            win_probability: to_decimal(win_probability),
            sharpe_ratio: to_decimal(sharpe),
            kelly_fraction,
            recommended_position_size,
            distribution: ReturnDistribution {
                mean: to_decimal(mean),
                std_dev: to_decimal(std_dev),
                min: to_decimal(samples[0]),
                max: to_decimal(samples[samples.len() - 1]),
                p5: to_decimal(var95),
                p25: to_decimal(percentile(&samples, 0.25)),
                p50: to_decimal(percentile(&samples, 0.50)),
                p75: to_decimal(percentile(&samples, 0.75)),
                p95: to_decimal(percentile(&samples, 0.95)),
            },
        })
    }
}

/// Two independent standard normal draws.
fn box_muller(rng: &mut StdRng) -> (f64, f64) {
    // gen::<f64>() is in [0, 1); shift to (0, 1] so ln() is finite.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (r * theta.cos(), r * theta.sin())
}

/// Nearest-rank percentile of sorted data.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn to_decimal(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO).round_dp(OUTPUT_DP)
}

// ═══════════════════════════════════════════════════════════════════════════
// Async service with cache and timeout
// ═══════════════════════════════════════════════════════════════════════════

struct CacheEntry {
    assessment: RiskAssessment,
    inserted_at: Instant,
}

/// Runs [`RiskEngine::assess`] on the blocking pool under a timeout and
/// caches results per (signal id, iterations) for a short TTL.
pub struct RiskService {
    engine: Arc<RiskEngine>,
    cache: Mutex<LruCache<(Uuid, usize), CacheEntry>>,
    cache_ttl: Duration,
    timeout: Duration,
}

impl RiskService {
    pub fn new(engine: Arc<RiskEngine>) -> Self {
        let cfg = engine.config();
        let size = NonZeroUsize::new(cfg.cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(size)),
            cache_ttl: Duration::from_secs(cfg.cache_ttl_seconds),
            timeout: Duration::from_millis(cfg.timeout_ms),
            engine,
        }
    }

    pub fn default_iterations(&self) -> usize {
        self.engine.config().default_iterations
    }

    pub async fn assess(
        &self,
        signal: Arc<Signal>,
        iterations: Option<usize>,
    ) -> Result<RiskAssessment, EngineError> {
        let iterations = iterations.unwrap_or_else(|| self.default_iterations());
        let key = (signal.id, iterations);

        if let Some(cached) = self.get_cached(&key) {
            debug!(signal_id = %signal.id, iterations, "returning cached risk assessment");
            return Ok(cached);
        }

        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.assess(&signal, iterations));

        let assessment = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => return Err(EngineError::Worker(join_err.to_string())),
            Err(_) => {
                warn!(iterations, timeout_ms = self.timeout.as_millis() as u64, "risk assessment timed out");
                return Err(EngineError::ComputationTimeout {
                    operation: format!("monte carlo ({iterations} iterations)"),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        self.set_cached(key, assessment.clone());
        Ok(assessment)
    }

    fn get_cached(&self, key: &(Uuid, usize)) -> Option<RiskAssessment> {
        let mut cache = self.cache.lock();
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() > self.cache_ttl {
            cache.pop(key);
            return None;
        }
        Some(entry.assessment.clone())
    }

    fn set_cached(&self, key: (Uuid, usize), assessment: RiskAssessment) {
        self.cache.lock().put(
            key,
            CacheEntry {
                assessment,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndicatorSet, RegimeState, Timeframe};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn seeded(seed: Option<u64>) -> RiskEngine {
        RiskEngine::new(RiskConfig {
            seed,
            ..RiskConfig::default()
        })
    }

    fn long_signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::H1,
            direction: Direction::Long,
            confidence: dec!(60),
            entry_price: dec!(100),
            stop_loss: Some(dec!(95)),
            take_profit: Some(dec!(110)),
            risk_reward_ratio: dec!(2),
            reasoning: Vec::new(),
            confluence_score: dec!(55),
            indicators: IndicatorSet {
                price: dec!(100),
                atr: dec!(2),
                ..IndicatorSet::default()
            },
            votes: Vec::new(),
            patterns: Vec::new(),
            regime: RegimeState::insufficient(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let signal = long_signal();

        let engine = seeded(Some(42));
        let a = engine.assess(&signal, 1000).unwrap();
        let b = engine.assess(&signal, 1000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.iterations, 1000);
        // Drift +4% against ~5.7% spread: roughly three wins in four.
        assert!(
            a.win_probability > dec!(0.65) && a.win_probability < dec!(0.87),
            "win probability {}",
            a.win_probability
        );
    }

    #[test]
    fn test_samples_bracketed_by_stop_and_target() {
        let a = seeded(Some(7)).assess(&long_signal(), 5000).unwrap();
        assert!(a.max_drawdown >= dec!(-0.05));
        assert!(a.distribution.max <= dec!(0.1));
        assert_eq!(a.max_drawdown, a.distribution.min);
        assert!(a.cvar95 <= a.var95);
        assert!(a.distribution.p25 <= a.distribution.p50 && a.distribution.p50 <= a.distribution.p75);
    }

    #[test]
    fn test_short_signal_profits_from_decline() {
        let mut s = long_signal();
        s.direction = Direction::Short;
        s.stop_loss = Some(dec!(105));
        s.take_profit = Some(dec!(90));
        let a = seeded(Some(1)).assess(&s, 2000).unwrap();
        assert!(a.expected_return > Decimal::ZERO);
        assert_eq!(a.direction, Direction::Short);
    }

    #[test]
    fn test_kelly_clamped_and_sized() {
        let mut s = long_signal();
        s.confidence = dec!(95);
        let a = seeded(Some(3)).assess(&s, 2000).unwrap();
        assert_eq!(a.kelly_fraction, dec!(0.25));
        // 10_000 × 0.25 × 0.5
        assert_eq!(a.recommended_position_size, dec!(1250));

        s.confidence = dec!(5);
        let b = seeded(Some(3)).assess(&s, 2000).unwrap();
        assert_eq!(b.kelly_fraction, Decimal::ZERO);
        assert_eq!(b.recommended_position_size, Decimal::ZERO);
    }

    #[test]
    fn test_flat_atr_falls_back_to_stop_distance() {
        let mut s = long_signal();
        s.indicators.atr = Decimal::ZERO;
        let a = seeded(Some(9)).assess(&s, 1000).unwrap();
        assert!(a.distribution.std_dev > Decimal::ZERO);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let engine = seeded(Some(1));
        let signal = long_signal();

        assert!(matches!(
            engine.assess(&signal, 0),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(matches!(
            engine.assess(&signal, 100_001),
            Err(EngineError::InvalidParameter { .. })
        ));

        let mut neutral = long_signal();
        neutral.direction = Direction::Neutral;
        assert!(matches!(
            engine.assess(&neutral, 100),
            Err(EngineError::InvalidParameter { .. })
        ));

        let mut no_stop = long_signal();
        no_stop.stop_loss = None;
        assert!(matches!(
            engine.assess(&no_stop, 100),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_service_caches_by_signal_and_iterations() {
        let service = RiskService::new(Arc::new(seeded(None)));
        let signal = Arc::new(long_signal());

        let a = service.assess(signal.clone(), Some(500)).await.unwrap();
        let b = service.assess(signal.clone(), Some(500)).await.unwrap();
        assert_eq!(a, b);

        let c = service.assess(signal, None).await.unwrap();
        assert_eq!(c.iterations, 1000);
    }

    #[tokio::test]
    async fn test_service_propagates_validation_error() {
        let service = RiskService::new(Arc::new(seeded(Some(1))));
        let mut neutral = long_signal();
        neutral.direction = Direction::Neutral;
        let err = service.assess(Arc::new(neutral), None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_service_times_out_long_simulation() {
        let service = RiskService::new(Arc::new(RiskEngine::new(RiskConfig {
            seed: Some(1),
            max_iterations: 2_000_000,
            timeout_ms: 1,
            ..RiskConfig::default()
        })));
        let err = service
            .assess(Arc::new(long_signal()), Some(2_000_000))
            .await
            .unwrap_err();
        match err {
            EngineError::ComputationTimeout { operation, timeout_ms } => {
                assert_eq!(timeout_ms, 1);
                assert!(operation.contains("2000000"), "{operation}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn prop_outputs_are_well_formed(
            seed in any::<u64>(),
            confidence in 5u32..95,
            iterations in 1usize..2000,
        ) {
            let mut s = long_signal();
            s.confidence = Decimal::from(confidence);
            let a = seeded(Some(seed)).assess(&s, iterations).unwrap();
            prop_assert!(a.win_probability >= Decimal::ZERO && a.win_probability <= Decimal::ONE);
            prop_assert!(a.kelly_fraction >= Decimal::ZERO && a.kelly_fraction <= dec!(0.25));
            prop_assert!(a.max_drawdown <= a.var95);
            prop_assert!(a.cvar95 <= a.var95);
        }
    }
}

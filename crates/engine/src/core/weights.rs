//! Adaptive indicator weighting driven by signal outcomes.
//!
//! Outcome counters are kept per (indicator, symbol, timeframe). Weights are
//! only recomputed in [`AdaptiveWeightManager::rebalance`], which builds a
//! complete new [`WeightBook`] and publishes it in a single pointer swap, so
//! a cycle holding a snapshot never sees a half-updated table.

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::WeightConfig;
use crate::types::{weight_sum, IndicatorKind, IndicatorWeight, PairKey, Timeframe, WeightTable};

/// Immutable set of weight tables published by the manager.
#[derive(Debug, Clone)]
pub struct WeightBook {
    default: WeightTable,
    tables: HashMap<PairKey, WeightTable>,
    /// Incremented on every published rebalance.
    pub version: u64,
}

impl WeightBook {
    /// Weights for a pair, falling back to the normalised initial table.
    pub fn table(&self, key: &PairKey) -> &WeightTable {
        self.tables.get(key).unwrap_or(&self.default)
    }

    pub fn default_table(&self) -> &WeightTable {
        &self.default
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct OutcomeCounter {
    total: u64,
    successful: u64,
    since_update: u64,
}

pub struct AdaptiveWeightManager {
    config: WeightConfig,
    book: RwLock<Arc<WeightBook>>,
    counters: Mutex<HashMap<(IndicatorKind, PairKey), OutcomeCounter>>,
}

impl AdaptiveWeightManager {
    pub fn new(config: WeightConfig) -> Self {
        let mut initial: WeightTable = IndicatorKind::ALL
            .iter()
            .map(|k| (*k, config.initial.get(k).copied().unwrap_or(config.min_weight)))
            .collect();
        normalize_bounded(&mut initial, config.min_weight, config.max_weight);

        Self {
            book: RwLock::new(Arc::new(WeightBook {
                default: initial,
                tables: HashMap::new(),
                version: 0,
            })),
            counters: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Count one graded vote. Takes effect at the next [`Self::rebalance`].
    pub fn record_outcome(
        &self,
        indicator: IndicatorKind,
        symbol: &str,
        timeframe: Timeframe,
        successful: bool,
    ) {
        let mut counters = self.counters.lock();
        let c = counters
            .entry((indicator, PairKey::new(symbol, timeframe)))
            .or_default();
        c.total += 1;
        c.since_update += 1;
        if successful {
            c.successful += 1;
        }
    }

    /// Current weight table for a pair (always sums to 1.0).
    pub fn current_weights(&self, symbol: &str, timeframe: Timeframe) -> WeightTable {
        self.snapshot()
            .table(&PairKey::new(symbol, timeframe))
            .clone()
    }

    /// The whole published book. Cheap; callers keep it for a full cycle.
    pub fn snapshot(&self) -> Arc<WeightBook> {
        Arc::clone(&self.book.read())
    }

    pub fn indicator_weight(
        &self,
        indicator: IndicatorKind,
        symbol: &str,
        timeframe: Timeframe,
    ) -> IndicatorWeight {
        let key = PairKey::new(symbol, timeframe);
        let weight = self
            .snapshot()
            .table(&key)
            .get(&indicator)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let c = self
            .counters
            .lock()
            .get(&(indicator, key))
            .copied()
            .unwrap_or_default();
        IndicatorWeight {
            weight,
            total_signals: c.total,
            successful_signals: c.successful,
        }
    }

    /// Recompute weights for every indicator with at least `update_threshold`
    /// new outcomes, renormalise the affected tables and publish a new book.
    ///
    /// Returns the number of indicator weights that were recomputed.
    pub fn rebalance(&self) -> usize {
        let cfg = &self.config;
        let mut counters = self.counters.lock();

        let due: Vec<(IndicatorKind, PairKey)> = counters
            .iter()
            .filter(|(_, c)| c.since_update >= cfg.update_threshold && c.total > 0)
            .map(|(k, _)| k.clone())
            .collect();
        if due.is_empty() {
            return 0;
        }

        let current = self.snapshot();
        let mut tables = current.tables.clone();

        for (indicator, key) in &due {
            let Some(counter) = counters.get_mut(&(*indicator, key.clone())) else {
                continue;
            };
            let accuracy =
                Decimal::from(counter.successful) / Decimal::from(counter.total);
            counter.since_update = 0;

            let table = tables
                .entry(key.clone())
                .or_insert_with(|| current.default.clone());
            let old = table.get(indicator).copied().unwrap_or(cfg.min_weight);
            let new = (old * accuracy / cfg.target_accuracy).clamp(cfg.min_weight, cfg.max_weight);
            table.insert(*indicator, new);

            debug!(
                pair = %key,
                %indicator,
                %accuracy,
                old = %old,
                new = %new,
                "indicator weight adjusted"
            );
        }
        drop(counters);

        for (_, key) in &due {
            if let Some(table) = tables.get_mut(key) {
                normalize_bounded(table, cfg.min_weight, cfg.max_weight);
            }
        }

        let version = current.version + 1;
        *self.book.write() = Arc::new(WeightBook {
            default: current.default.clone(),
            tables,
            version,
        });

        info!(adjusted = due.len(), version, "weight book rebalanced");
        due.len()
    }
}

/// Rescale `table` to sum to exactly 1.0 with every weight in `[min, max]`.
///
/// Weights that would leave the bounds are pinned to them and the remainder
/// is redistributed across the rest proportionally. Needs
/// `min * n <= 1 <= max * n`, which config validation guarantees.
pub fn normalize_bounded(table: &mut WeightTable, min: Decimal, max: Decimal) {
    if table.is_empty() {
        return;
    }
    let raw = table.clone();
    let mut pinned: HashMap<IndicatorKind, Decimal> = HashMap::new();

    for _ in 0..=raw.len() {
        let free: Vec<IndicatorKind> = raw
            .keys()
            .filter(|k| !pinned.contains_key(*k))
            .copied()
            .collect();
        if free.is_empty() {
            break;
        }
        let remaining = Decimal::ONE - pinned.values().copied().sum::<Decimal>();
        let free_sum: Decimal = free.iter().map(|k| raw[k]).sum();
        let share = |k: &IndicatorKind| {
            if free_sum > Decimal::ZERO {
                raw[k] / free_sum * remaining
            } else {
                remaining / Decimal::from(free.len() as u64)
            }
        };

        let mut violated = false;
        for k in &free {
            let v = share(k);
            if v < min {
                pinned.insert(*k, min);
                violated = true;
            } else if v > max {
                pinned.insert(*k, max);
                violated = true;
            }
        }
        if violated {
            continue;
        }
        for k in &free {
            table.insert(*k, share(k));
        }
        break;
    }

    for (k, v) in pinned {
        table.insert(k, v);
    }

    // Decimal division residue goes to the largest weight strictly inside the bounds.
    let residue = Decimal::ONE - weight_sum(table);
    if !residue.is_zero() {
        if let Some(w) = table
            .values_mut()
            .filter(|w| **w > min && **w < max)
            .filter(|w| **w + residue >= min && **w + residue <= max)
            .max()
        {
            *w += residue;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WEIGHT_SUM_TOLERANCE;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn manager() -> AdaptiveWeightManager {
        AdaptiveWeightManager::new(WeightConfig::default())
    }

    fn assert_sums_to_one(table: &WeightTable) {
        let sum = weight_sum(table);
        assert!(
            (sum - Decimal::ONE).abs() <= WEIGHT_SUM_TOLERANCE,
            "weights sum to {sum}"
        );
    }

    #[test]
    fn test_initial_weights_normalised() {
        let m = manager();
        let w = m.current_weights("BTCUSDT", Timeframe::H1);
        assert_eq!(w.len(), IndicatorKind::ALL.len());
        assert_sums_to_one(&w);
    }

    #[test]
    fn test_accurate_indicator_gains_weight() {
        let m = manager();
        let before = m.current_weights("BTCUSDT", Timeframe::H1)[&IndicatorKind::Rsi];

        for i in 0..15 {
            m.record_outcome(IndicatorKind::Rsi, "BTCUSDT", Timeframe::H1, i < 12);
        }
        assert_eq!(m.rebalance(), 1);

        let after = m.current_weights("BTCUSDT", Timeframe::H1);
        assert!(after[&IndicatorKind::Rsi] > before);
        assert_sums_to_one(&after);

        let view = m.indicator_weight(IndicatorKind::Rsi, "BTCUSDT", Timeframe::H1);
        assert_eq!(view.total_signals, 15);
        assert_eq!(view.successful_signals, 12);
        assert_eq!(view.accuracy(), Some(dec!(0.8)));
    }

    #[test]
    fn test_below_threshold_does_not_rebalance() {
        let m = manager();
        for _ in 0..9 {
            m.record_outcome(IndicatorKind::Macd, "BTCUSDT", Timeframe::H1, false);
        }
        assert_eq!(m.rebalance(), 0);
        assert_eq!(m.snapshot().version, 0);
    }

    #[test]
    fn test_other_pairs_keep_default_table() {
        let m = manager();
        for _ in 0..10 {
            m.record_outcome(IndicatorKind::Macd, "BTCUSDT", Timeframe::H1, false);
        }
        m.rebalance();
        let book = m.snapshot();
        assert_eq!(
            book.table(&PairKey::new("ETHUSDT", Timeframe::H1)),
            book.default_table()
        );
        let macd = m.current_weights("BTCUSDT", Timeframe::H1)[&IndicatorKind::Macd];
        assert!(macd < book.default_table()[&IndicatorKind::Macd]);
        assert!(macd >= dec!(0.01));
    }

    #[test]
    fn test_snapshot_is_isolated_from_rebalance() {
        let m = manager();
        let held = m.snapshot();
        for _ in 0..10 {
            m.record_outcome(IndicatorKind::Volume, "ETHUSDT", Timeframe::H4, true);
        }
        m.rebalance();
        assert_eq!(held.version, 0);
        assert_eq!(m.snapshot().version, 1);
        assert_eq!(
            held.table(&PairKey::new("ETHUSDT", Timeframe::H4)),
            held.default_table()
        );
    }

    #[test]
    fn test_counter_resets_after_update() {
        let m = manager();
        for _ in 0..10 {
            m.record_outcome(IndicatorKind::Rsi, "BTCUSDT", Timeframe::H1, true);
        }
        assert_eq!(m.rebalance(), 1);
        assert_eq!(m.rebalance(), 0);
    }

    #[test]
    fn test_normalize_respects_upper_bound() {
        let mut t: WeightTable = IndicatorKind::ALL.iter().map(|k| (*k, dec!(0.01))).collect();
        t.insert(IndicatorKind::Rsi, dec!(10));
        normalize_bounded(&mut t, dec!(0.01), dec!(0.5));
        assert_sums_to_one(&t);
        assert_eq!(t[&IndicatorKind::Rsi], dec!(0.5));
        assert!(t.values().all(|w| *w >= dec!(0.01) && *w <= dec!(0.5)));
    }

    proptest! {
        #[test]
        fn prop_weights_always_sum_to_one(
            outcomes in proptest::collection::vec((0usize..8, any::<bool>()), 0..400),
        ) {
            let m = manager();
            for (i, (idx, ok)) in outcomes.iter().enumerate() {
                m.record_outcome(IndicatorKind::ALL[*idx], "BTCUSDT", Timeframe::H1, *ok);
                if i % 37 == 0 {
                    m.rebalance();
                }
            }
            m.rebalance();
            let w = m.current_weights("BTCUSDT", Timeframe::H1);
            let sum = weight_sum(&w);
            prop_assert!((sum - Decimal::ONE).abs() <= WEIGHT_SUM_TOLERANCE);
            for v in w.values() {
                prop_assert!(*v >= dec!(0.01) - WEIGHT_SUM_TOLERANCE && *v <= dec!(0.5) + WEIGHT_SUM_TOLERANCE);
            }
        }
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::indicator::IndicatorKind;

/// Weight of one indicator plus its outcome counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorWeight {
    #[serde(with = "rust_decimal::serde::str")]
    pub weight: Decimal,
    pub total_signals: u64,
    pub successful_signals: u64,
}

impl IndicatorWeight {
    /// `successful / total`, `None` before the first outcome.
    pub fn accuracy(&self) -> Option<Decimal> {
        if self.total_signals == 0 {
            None
        } else {
            Some(Decimal::from(self.successful_signals) / Decimal::from(self.total_signals))
        }
    }
}

/// Weights for the active indicator set of one (symbol, timeframe).
///
/// Always sums to 1.0 once produced by the weight manager.
pub type WeightTable = BTreeMap<IndicatorKind, Decimal>;

/// Sum of all weights in a table.
pub fn weight_sum(table: &WeightTable) -> Decimal {
    table.values().copied().sum()
}

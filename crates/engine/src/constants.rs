use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Config directory used when `ENGINE_CONFIG_DIR` is unset.
pub const DEFAULT_CONFIG_DIR: &str = "config";

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Buffered outcome events awaiting the feedback worker.
pub const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// Buffered commands awaiting the cycle scheduler.
pub const SCHEDULER_COMMAND_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Reasoning entry added when indicators disagree strongly.
pub const CONFLICT_REASON: &str = "Conflicting signals detected";

/// Allowed drift of a normalised weight table from 1.0.
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.000001);

use thiserror::Error;

/// Typed error hierarchy for the confluence engine.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation. Conflicting indicator evidence is not an
/// error: it is reported in a signal's reasoning instead.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Market data --------------------------------------------------------
    #[error("market data unavailable for {symbol} {timeframe}: {reason}")]
    DataUnavailable {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    #[error("insufficient history for {symbol} {timeframe}: {available} candles (need {required})")]
    InsufficientHistory {
        symbol: String,
        timeframe: String,
        available: usize,
        required: usize,
    },

    // -- Requests -----------------------------------------------------------
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    // -- Computation --------------------------------------------------------
    #[error("computation timed out after {timeout_ms}ms: {operation}")]
    ComputationTimeout { operation: String, timeout_ms: u64 },

    #[error("worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

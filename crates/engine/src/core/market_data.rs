//! Candle source abstraction and the file-backed implementation used by the
//! binary.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::EngineError;
use crate::types::{Candle, Timeframe};

/// Provider of historical candles. Acquisition, rate limiting and provider
/// caching live behind this trait.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `min_count` most recent candles, oldest first. Fewer (even
    /// zero) is not an error; an unreachable source is.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        min_count: usize,
    ) -> Result<Vec<Candle>, EngineError>;

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, EngineError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// JSON files
// ═══════════════════════════════════════════════════════════════════════════

/// One row of a candle file. Prices accept JSON numbers or strings.
#[derive(Debug, Deserialize)]
struct CandleRecord {
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Reads `<data_dir>/<SYMBOL>_<interval>.json`, an array of candle records.
pub struct JsonCandleSource {
    data_dir: PathBuf,
}

impl JsonCandleSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.json", symbol.to_uppercase(), timeframe.as_interval()))
    }

    async fn load(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, EngineError> {
        let path = self.path_for(symbol, timeframe);
        let unavailable = |reason: String| EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            reason,
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
        let records: Vec<CandleRecord> = serde_json::from_str(&contents)
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;

        let mut candles: Vec<Candle> = records
            .into_iter()
            .map(|r| Candle {
                symbol: symbol.to_uppercase(),
                timeframe,
                timestamp: r.timestamp,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

#[async_trait]
impl MarketDataSource for JsonCandleSource {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        min_count: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let mut candles = self.load(symbol, timeframe).await?;
        let skip = candles.len().saturating_sub(min_count);
        candles.drain(..skip);
        debug!(symbol, %timeframe, count = candles.len(), "candles loaded");
        Ok(candles)
    }

    /// Last close of the shortest timeframe file present for `symbol`.
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, EngineError> {
        for tf in Timeframe::ALL {
            if !tokio::fs::try_exists(self.path_for(symbol, tf)).await.unwrap_or(false) {
                continue;
            }
            let candles = self.load(symbol, tf).await?;
            return match candles.last() {
                Some(c) => Ok(c.close),
                None => Err(EngineError::InsufficientHistory {
                    symbol: symbol.to_string(),
                    timeframe: tf.to_string(),
                    available: 0,
                    required: 1,
                }),
            };
        }
        Err(EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe: "*".into(),
            reason: format!("no candle files under {}", self.data_dir.display()),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-memory source for tests
// ═══════════════════════════════════════════════════════════════════════════


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    const ROWS: &str = r#"[
        {"timestamp": 3000, "open": "3", "high": "4", "low": "2", "close": "3.5", "volume": "10"},
        {"timestamp": 1000, "open": 1, "high": 2, "low": 0.5, "close": 1.5, "volume": 10},
        {"timestamp": 2000, "open": "2", "high": "3", "low": "1", "close": "2.5", "volume": "10"}
    ]"#;

    #[tokio::test]
    async fn test_reads_sorted_trailing_window() {
        let dir = TempDir::new().unwrap();
        write(&dir, "BTCUSDT_1h.json", ROWS);
        let source = JsonCandleSource::new(dir.path());

        let candles = source.get_candles("btcusdt", Timeframe::H1, 2).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 2000);
        assert_eq!(candles[1].close, dec!(3.5));
        assert_eq!(candles[1].symbol, "BTCUSDT");
        assert_eq!(candles[1].timeframe, Timeframe::H1);

        let all = source.get_candles("BTCUSDT", Timeframe::H1, 500).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].close, dec!(1.5));
    }

    #[tokio::test]
    async fn test_missing_file_is_data_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = JsonCandleSource::new(dir.path());
        let err = source.get_candles("ETHUSDT", Timeframe::H4, 10).await.unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_file_is_data_unavailable() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ETHUSDT_4h.json", "{not json");
        let source = JsonCandleSource::new(dir.path());
        let err = source.get_candles("ETHUSDT", Timeframe::H4, 10).await.unwrap_err();
        assert!(err.to_string().contains("ETHUSDT_4h.json"));
    }

    #[tokio::test]
    async fn test_current_price_from_shortest_timeframe() {
        let dir = TempDir::new().unwrap();
        write(&dir, "SOLUSDT_1d.json", ROWS);
        write(
            &dir,
            "SOLUSDT_15m.json",
            r#"[{"timestamp": 1, "open": 9, "high": 9, "low": 9, "close": 9.25, "volume": 1}]"#,
        );
        let source = JsonCandleSource::new(dir.path());
        assert_eq!(source.get_current_price("SOLUSDT").await.unwrap(), dec!(9.25));
    }

    #[tokio::test]
    async fn test_current_price_empty_file_is_insufficient() {
        let dir = TempDir::new().unwrap();
        write(&dir, "BNBUSDT_1h.json", "[]");
        let source = JsonCandleSource::new(dir.path());
        let err = source.get_current_price("BNBUSDT").await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHistory { .. }));
    }
}

//! CSV tick replay source.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use riskbook_core::{DataError, MarketDataSource, PriceTick};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Timestamp", alias = "time", alias = "date")]
    timestamp: String,
    #[serde(alias = "Symbol")]
    symbol: String,
    #[serde(alias = "Price", alias = "close", alias = "Close")]
    price: Decimal,
    #[serde(alias = "Bid", default)]
    bid: Option<Decimal>,
    #[serde(alias = "Ask", default)]
    ask: Option<Decimal>,
    #[serde(alias = "Volume", default)]
    volume: Option<Decimal>,
}

/// Replays ticks recorded in a CSV file.
///
/// Expected columns: `timestamp,symbol,price[,bid,ask,volume]`.
pub struct CsvTickSource {
    ticks: Vec<PriceTick>,
    pace: Option<Duration>,
    capacity: usize,
}

impl CsvTickSource {
    /// Load all ticks from a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NoDataAvailable);
        }
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| DataError::ParseError(e.to_string()))?;
        Self::from_csv(reader)
    }

    /// Load ticks from any CSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(reader)
    }

    /// Sleep between replayed ticks.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Channel capacity handed to subscribers.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Loaded ticks in timestamp order.
    pub fn ticks(&self) -> &[PriceTick] {
        &self.ticks
    }

    /// Distinct symbols in the file.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.ticks.iter().map(|t| t.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, DataError> {
        let mut ticks = Vec::new();

        for result in reader.deserialize() {
            let record: CsvRecord = result.map_err(|e| DataError::ParseError(e.to_string()))?;
            let timestamp = parse_timestamp(&record.timestamp)?;

            let mut tick = PriceTick::new(record.symbol, record.price, timestamp);
            if let (Some(bid), Some(ask)) = (record.bid, record.ask) {
                tick = tick.with_book(bid, ask);
            }
            if let Some(volume) = record.volume {
                tick = tick.with_volume(volume);
            }
            if !tick.is_valid() {
                return Err(DataError::ParseError(format!(
                    "Invalid tick for {} at {}",
                    tick.symbol, record.timestamp
                )));
            }
            ticks.push(tick);
        }

        // Stable sort keeps file order for equal timestamps
        ticks.sort_by_key(|t| t.timestamp);

        Ok(Self {
            ticks,
            pace: None,
            capacity: 1024,
        })
    }
}

#[async_trait]
impl MarketDataSource for CsvTickSource {
    async fn subscribe(&self, symbols: &[String]) -> Result<mpsc::Receiver<PriceTick>, DataError> {
        if self.ticks.is_empty() {
            return Err(DataError::NoDataAvailable);
        }
        Ok(crate::spawn_replay(self.ticks.clone(), symbols, self.pace, self.capacity))
    }

    async fn latest_tick(&self, symbol: &str) -> Result<Option<PriceTick>, DataError> {
        Ok(self.ticks.iter().rev().find(|t| t.symbol == symbol).cloned())
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S` or Unix seconds/milliseconds.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DataError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(ts) = value.parse::<i64>() {
        // Assume milliseconds if > 10 digits
        let parsed = if ts > 10_000_000_000 {
            Utc.timestamp_millis_opt(ts).single()
        } else {
            Utc.timestamp_opt(ts, 0).single()
        };
        if let Some(dt) = parsed {
            return Ok(dt);
        }
    }
    Err(DataError::ParseError(format!("Could not parse timestamp: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "\
timestamp,symbol,price,bid,ask,volume
2024-03-01 00:00:02,ETHUSDT,3000,2999.5,3000.5,12
2024-03-01 00:00:01,BTCUSDT,50000,49999,50001,1.5
2024-03-01 00:00:03,BTCUSDT,50100,,,
";

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-01-15 10:30:00").is_ok());
        assert!(parse_timestamp("2024-01-15T10:30:00Z").is_ok());
        assert!(parse_timestamp("1705312800000").is_ok()); // Unix ms
        assert!(parse_timestamp("1705312800").is_ok()); // Unix sec
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_load_sorts_by_timestamp() {
        let source = CsvTickSource::from_reader(SAMPLE.as_bytes()).unwrap();
        let ticks = source.ticks();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].symbol, "BTCUSDT");
        assert_eq!(ticks[1].bid, dec!(2999.5));
        assert_eq!(ticks[2].bid, dec!(50100));
        assert_eq!(source.symbols(), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let bad = "timestamp,symbol,price\n2024-03-01 00:00:00,BTCUSDT,-1\n";
        assert!(CsvTickSource::from_reader(bad.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_filters_symbols() {
        let source = CsvTickSource::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut rx = source.subscribe(&["BTCUSDT".to_string()]).await.unwrap();

        let mut prices = Vec::new();
        while let Some(tick) = rx.recv().await {
            prices.push(tick.price);
        }
        assert_eq!(prices, vec![dec!(50000), dec!(50100)]);

        let latest = source.latest_tick("ETHUSDT").await.unwrap().unwrap();
        assert_eq!(latest.price, dec!(3000));
    }
}

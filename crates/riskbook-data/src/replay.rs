//! In-memory scripted market data source.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use riskbook_core::{DataError, MarketDataSource, PriceTick};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Market data source that replays a fixed script of ticks.
///
/// Used by the simulator and tests in place of a live feed.
#[derive(Default)]
pub struct ScriptedSource {
    ticks: RwLock<Vec<PriceTick>>,
    pace: Option<std::time::Duration>,
}

impl ScriptedSource {
    pub fn new(ticks: Vec<PriceTick>) -> Self {
        Self {
            ticks: RwLock::new(ticks),
            pace: None,
        }
    }

    /// Build a one-symbol script from a price path, one tick per `step`.
    pub fn from_prices(
        symbol: &str,
        prices: &[Decimal],
        start: DateTime<Utc>,
        step: Duration,
    ) -> Self {
        let ticks = prices
            .iter()
            .enumerate()
            .map(|(i, price)| PriceTick::new(symbol, *price, start + step * i as i32))
            .collect();
        Self::new(ticks)
    }

    /// Sleep between replayed ticks.
    pub fn with_pace(mut self, pace: std::time::Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Append a tick to the script.
    pub fn push(&self, tick: PriceTick) {
        self.ticks.write().push(tick);
    }

    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.read().is_empty()
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn subscribe(&self, symbols: &[String]) -> Result<mpsc::Receiver<PriceTick>, DataError> {
        let ticks = self.ticks.read().clone();
        let capacity = ticks.len();
        Ok(crate::spawn_replay(ticks, symbols, self.pace, capacity))
    }

    async fn latest_tick(&self, symbol: &str) -> Result<Option<PriceTick>, DataError> {
        Ok(self.ticks.read().iter().rev().find(|t| t.symbol == symbol).cloned())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_replays_in_order() {
        let source = ScriptedSource::from_prices(
            "BTCUSDT",
            &[dec!(50000), dec!(50500), dec!(49000)],
            Utc::now(),
            Duration::seconds(1),
        );
        source.push(PriceTick::new("ETHUSDT", dec!(3000), Utc::now()));
        assert_eq!(source.len(), 4);

        let mut rx = source.subscribe(&[]).await.unwrap();
        let mut seen = Vec::new();
        while let Some(tick) = rx.recv().await {
            seen.push((tick.symbol, tick.price));
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[2], ("BTCUSDT".to_string(), dec!(49000)));

        let latest = source.latest_tick("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.price, dec!(49000));
        assert!(source.latest_tick("SOLUSDT").await.unwrap().is_none());
    }
}

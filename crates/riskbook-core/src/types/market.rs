//! Market data consumed by the engine.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Symbol
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// Best bid price
    pub bid: Decimal,
    /// Best ask price
    pub ask: Decimal,
    /// Traded volume reported with the tick
    pub volume: Decimal,
    /// Exchange timestamp
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    /// Create a tick with a zero-width book at `price`.
    pub fn new(symbol: impl Into<String>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            bid: price,
            ask: price,
            volume: Decimal::ZERO,
            timestamp,
        }
    }

    /// Set the best bid and ask.
    pub fn with_book(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    /// Set the reported volume.
    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    /// Get the mid price.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Get the spread.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Get the spread as a percentage of the mid price.
    pub fn spread_percent(&self) -> f64 {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return 0.0;
        }
        (self.spread() / mid * Decimal::from(100)).to_f64().unwrap_or(0.0)
    }

    /// Whether the tick carries a usable price.
    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO && self.bid <= self.ask
    }
}

/// Market inputs for assessing a single position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    /// Recent price change in percent (e.g. 24h change)
    pub change_pct: f64,
    /// Bid/ask spread in percent of mid
    pub spread_pct: f64,
    /// Recent traded volume
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Build a snapshot from the latest tick and a recent price change.
    pub fn from_tick(tick: &PriceTick, change_pct: f64) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            price: tick.price,
            change_pct,
            spread_pct: tick.spread_percent(),
            volume: tick.volume.to_f64().unwrap_or(0.0),
            timestamp: tick.timestamp,
        }
    }

    /// Neutral snapshot used when no market data has been seen for a symbol.
    pub fn flat(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_pct: 0.0,
            spread_pct: 0.0,
            volume: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Market-wide inputs for the system risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    /// Mean realized volatility across tracked symbols (fraction)
    pub average_volatility: f64,
    /// VIX-like volatility index
    pub vix_index: f64,
    /// Fear and greed index, 0-100
    pub fear_greed_index: f64,
    /// Mean bid/ask spread across tracked symbols (percent)
    pub average_spread: f64,
    /// Mean recent traded volume
    pub average_volume: f64,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            average_volatility: 0.02,
            vix_index: 20.0,
            fear_greed_index: 50.0,
            average_spread: 0.01,
            average_volume: 1_000_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_calculations() {
        let tick = PriceTick::new("BTCUSDT", dec!(150), Utc::now())
            .with_book(dec!(149.95), dec!(150.05))
            .with_volume(dec!(12));

        assert_eq!(tick.mid(), dec!(150));
        assert_eq!(tick.spread(), dec!(0.10));
        assert!((tick.spread_percent() - 0.0667).abs() < 0.001);
        assert!(tick.is_valid());
    }

    #[test]
    fn test_crossed_book_is_invalid() {
        let tick = PriceTick::new("BTCUSDT", dec!(150), Utc::now()).with_book(dec!(151), dec!(150));
        assert!(!tick.is_valid());
        assert!(!PriceTick::new("BTCUSDT", Decimal::ZERO, Utc::now()).is_valid());
    }

    #[test]
    fn test_snapshot_from_tick() {
        let tick = PriceTick::new("ETHUSDT", dec!(3000), Utc::now()).with_volume(dec!(250));
        let snapshot = MarketSnapshot::from_tick(&tick, -2.5);
        assert_eq!(snapshot.price, dec!(3000));
        assert_eq!(snapshot.spread_pct, 0.0);
        assert_eq!(snapshot.volume, 250.0);
        assert_eq!(snapshot.change_pct, -2.5);
    }
}

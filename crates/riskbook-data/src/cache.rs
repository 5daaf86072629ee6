//! Last-known price cache.

use chrono::{DateTime, Duration, Utc};
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use riskbook_core::{MarketConditions, MarketSnapshot, PriceTick};
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};

/// Per-symbol view derived from recent ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub last_price: Decimal,
    /// Percent change from the oldest retained tick
    pub change_pct: f64,
    /// Standard deviation of tick-to-tick log returns
    pub volatility: f64,
    pub spread_pct: f64,
    pub volume: f64,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug)]
struct SymbolEntry {
    last: PriceTick,
    prices: VecDeque<Decimal>,
}

/// Thread-safe cache of the latest tick and a bounded price history per symbol.
///
/// Positions keep their last applied price when the feed goes quiet; the
/// cache only reports which symbols are stale.
#[derive(Debug)]
pub struct PriceCache {
    entries: RwLock<HashMap<String, SymbolEntry>>,
    max_history: usize,
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(500)
    }
}

impl PriceCache {
    /// Create a cache retaining up to `max_history` prices per symbol.
    pub fn new(max_history: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_history: max_history.max(2),
        }
    }

    /// Record a tick. Invalid ticks are ignored and reported as `false`.
    pub fn update(&self, tick: &PriceTick) -> bool {
        if !tick.is_valid() {
            return false;
        }
        let mut entries = self.entries.write();
        let entry = entries
            .entry(tick.symbol.clone())
            .or_insert_with(|| SymbolEntry {
                last: tick.clone(),
                prices: VecDeque::with_capacity(self.max_history),
            });
        entry.last = tick.clone();
        entry.prices.push_back(tick.price);
        while entry.prices.len() > self.max_history {
            entry.prices.pop_front();
        }
        true
    }

    /// Latest tick for a symbol.
    pub fn latest(&self, symbol: &str) -> Option<PriceTick> {
        self.entries.read().get(symbol).map(|e| e.last.clone())
    }

    /// Latest price for a symbol.
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.entries.read().get(symbol).map(|e| e.last.price)
    }

    /// Symbols seen so far.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Symbols whose last tick is older than `stale_after` at `now`.
    pub fn stale_symbols(&self, now: DateTime<Utc>, stale_after: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| now - e.last.timestamp > stale_after)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Derived statistics for a symbol.
    pub fn stats(&self, symbol: &str) -> Option<SymbolStats> {
        let entries = self.entries.read();
        let entry = entries.get(symbol)?;
        Some(SymbolStats {
            symbol: symbol.to_string(),
            last_price: entry.last.price,
            change_pct: change_pct(&entry.prices),
            volatility: realized_volatility(&entry.prices),
            spread_pct: entry.last.spread_percent(),
            volume: entry.last.volume.to_f64().unwrap_or(0.0),
            last_update: entry.last.timestamp,
        })
    }

    /// Market snapshot for assessing a position on `symbol`.
    pub fn snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        let entries = self.entries.read();
        let entry = entries.get(symbol)?;
        Some(MarketSnapshot::from_tick(&entry.last, change_pct(&entry.prices)))
    }

    /// Market-wide conditions averaged over every tracked symbol.
    ///
    /// Symbols without a quoted book or reported volume do not contribute to
    /// the spread or volume averages; with no contributors the defaults are
    /// kept. Sentiment inputs are not derived from prices and are passed
    /// through.
    pub fn market_conditions(&self, vix_index: f64, fear_greed_index: f64) -> MarketConditions {
        let defaults = MarketConditions::default();
        let stats: Vec<SymbolStats> = self
            .symbols()
            .iter()
            .filter_map(|s| self.stats(s))
            .collect();

        let spreads: Vec<f64> = stats.iter().map(|s| s.spread_pct).filter(|s| *s > 0.0).collect();
        let volumes: Vec<f64> = stats.iter().map(|s| s.volume).filter(|v| *v > 0.0).collect();

        MarketConditions {
            average_volatility: mean(stats.iter().map(|s| s.volatility))
                .unwrap_or(defaults.average_volatility),
            vix_index,
            fear_greed_index,
            average_spread: mean(spreads.into_iter()).unwrap_or(defaults.average_spread),
            average_volume: mean(volumes.into_iter()).unwrap_or(defaults.average_volume),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn change_pct(prices: &VecDeque<Decimal>) -> f64 {
    match (prices.front(), prices.back()) {
        (Some(first), Some(last)) if *first > Decimal::ZERO => ((*last - *first) / *first
            * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn realized_volatility(prices: &VecDeque<Decimal>) -> f64 {
    let returns: Vec<f64> = prices
        .iter()
        .zip(prices.iter().skip(1))
        .filter_map(|(prev, next)| {
            let prev = prev.to_f64()?;
            let next = next.to_f64()?;
            (prev > 0.0 && next > 0.0).then(|| (next / prev).ln())
        })
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.iter().std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(symbol: &str, price: Decimal, at: DateTime<Utc>) -> PriceTick {
        PriceTick::new(symbol, price, at)
    }

    #[test]
    fn test_latest_and_change() {
        let cache = PriceCache::new(10);
        let now = Utc::now();
        cache.update(&tick("BTCUSDT", dec!(50000), now));
        cache.update(&tick("BTCUSDT", dec!(51000), now));

        assert_eq!(cache.last_price("BTCUSDT"), Some(dec!(51000)));
        let stats = cache.stats("BTCUSDT").unwrap();
        assert!((stats.change_pct - 2.0).abs() < 1e-9);
        assert!(cache.last_price("ETHUSDT").is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let cache = PriceCache::new(3);
        let now = Utc::now();
        for price in [dec!(100), dec!(110), dec!(120), dec!(130)] {
            cache.update(&tick("X", price, now));
        }
        // Oldest retained is 110
        let change = cache.stats("X").unwrap().change_pct;
        assert!((change - (20.0 / 110.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_ticks_are_ignored() {
        let cache = PriceCache::default();
        assert!(!cache.update(&tick("BTCUSDT", Decimal::ZERO, Utc::now())));
        assert!(cache.symbols().is_empty());
    }

    #[test]
    fn test_stale_symbols() {
        let cache = PriceCache::default();
        let now = Utc::now();
        cache.update(&tick("BTCUSDT", dec!(50000), now - Duration::seconds(120)));
        cache.update(&tick("ETHUSDT", dec!(3000), now));

        assert_eq!(cache.stale_symbols(now, Duration::seconds(60)), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn test_volatility_and_conditions() {
        let cache = PriceCache::default();
        let now = Utc::now();
        for price in [dec!(100), dec!(102), dec!(99), dec!(103), dec!(101)] {
            cache.update(&tick("BTCUSDT", price, now).with_book(price - dec!(0.05), price + dec!(0.05)));
        }
        let stats = cache.stats("BTCUSDT").unwrap();
        assert!(stats.volatility > 0.01 && stats.volatility < 0.05);

        let conditions = cache.market_conditions(25.0, 60.0);
        assert_eq!(conditions.vix_index, 25.0);
        assert!((conditions.average_volatility - stats.volatility).abs() < 1e-12);
        assert!(conditions.average_spread > 0.0);
        // No volume reported on any tick
        assert_eq!(conditions.average_volume, MarketConditions::default().average_volume);

        let flat = PriceCache::default().market_conditions(20.0, 50.0);
        assert_eq!(flat, MarketConditions::default());
    }
}

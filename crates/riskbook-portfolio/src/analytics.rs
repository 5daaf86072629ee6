//! Performance analytics over closed positions.

use chrono::{DateTime, NaiveDate, Utc};
use num_traits::ToPrimitive;
use riskbook_core::Position;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate for one bucket (a day or a symbol).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketPerformance {
    pub trades: usize,
    pub winning_trades: usize,
    pub profit: Decimal,
}

impl BucketPerformance {
    fn add(&mut self, pnl: Decimal) {
        self.trades += 1;
        self.profit += pnl;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        }
    }

    pub fn win_rate_pct(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades * 100) / Decimal::from(self.trades)
    }
}

/// Trade statistics over a window of closed positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalytics {
    /// Window length in days
    pub period_days: u32,
    /// Total number of closed positions
    pub total_trades: usize,
    /// Positions with positive realized P&L
    pub winning_trades: usize,
    /// Positions with zero or negative realized P&L
    pub losing_trades: usize,
    /// Win rate percentage
    pub win_rate_pct: Decimal,
    pub total_profit: Decimal,
    /// Average profit per winning trade
    pub avg_win: Decimal,
    /// Average loss per losing trade (positive number)
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    /// Gross profit / gross loss; `None` without losses
    pub profit_factor: Option<f64>,
    /// Keyed by close date (UTC)
    pub daily: BTreeMap<NaiveDate, BucketPerformance>,
    pub by_symbol: BTreeMap<String, BucketPerformance>,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceAnalytics {
    /// Compute analytics from closed positions.
    pub fn from_closed(positions: &[Position], period_days: u32) -> Self {
        let mut analytics = Self {
            period_days,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_pct: Decimal::ZERO,
            total_profit: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            profit_factor: None,
            daily: BTreeMap::new(),
            by_symbol: BTreeMap::new(),
            generated_at: Utc::now(),
        };

        let mut gross_profit = Decimal::ZERO;
        let mut gross_loss = Decimal::ZERO;

        for position in positions.iter().filter(|p| !p.is_open()) {
            let pnl = position.realized_pnl;
            analytics.total_trades += 1;
            analytics.total_profit += pnl;

            if pnl > Decimal::ZERO {
                analytics.winning_trades += 1;
                gross_profit += pnl;
                analytics.largest_win = analytics.largest_win.max(pnl);
            } else {
                analytics.losing_trades += 1;
                gross_loss += pnl.abs();
                analytics.largest_loss = analytics.largest_loss.min(pnl);
            }

            let day = position.closed_at.unwrap_or(position.updated_at).date_naive();
            analytics.daily.entry(day).or_default().add(pnl);
            analytics
                .by_symbol
                .entry(position.symbol.clone())
                .or_default()
                .add(pnl);
        }

        if analytics.total_trades > 0 {
            analytics.win_rate_pct = Decimal::from(analytics.winning_trades) * dec!(100)
                / Decimal::from(analytics.total_trades);
        }
        if analytics.winning_trades > 0 {
            analytics.avg_win = gross_profit / Decimal::from(analytics.winning_trades);
        }
        if analytics.losing_trades > 0 {
            analytics.avg_loss = gross_loss / Decimal::from(analytics.losing_trades);
        }
        if gross_loss > Decimal::ZERO {
            analytics.profit_factor = (gross_profit / gross_loss).to_f64();
        }

        analytics
    }

    /// Symbol with the highest total profit.
    pub fn best_symbol(&self) -> Option<(&str, Decimal)> {
        self.by_symbol
            .iter()
            .max_by_key(|(_, b)| b.profit)
            .map(|(symbol, b)| (symbol.as_str(), b.profit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskbook_core::{CloseReason, OpenPosition, PositionId};

    fn closed(seq: u64, symbol: &str, entry: Decimal, exit: Decimal) -> Position {
        let params = OpenPosition::long(symbol, dec!(1), entry);
        let mut position = Position::new(PositionId::new(seq, symbol, params.side), &params, Utc::now());
        position.update_price(exit, Utc::now());
        position.close_out(CloseReason::Manual("test".into()), Utc::now());
        position
    }

    #[test]
    fn test_trade_statistics() {
        let positions = vec![
            closed(1, "BTCUSDT", dec!(100), dec!(130)),
            closed(2, "BTCUSDT", dec!(100), dec!(90)),
            closed(3, "ETHUSDT", dec!(100), dec!(110)),
            closed(4, "ETHUSDT", dec!(100), dec!(70)),
        ];
        let analytics = PerformanceAnalytics::from_closed(&positions, 7);

        assert_eq!(analytics.total_trades, 4);
        assert_eq!(analytics.winning_trades, 2);
        assert_eq!(analytics.win_rate_pct, dec!(50));
        assert_eq!(analytics.total_profit, dec!(0));
        assert_eq!(analytics.avg_win, dec!(20));
        assert_eq!(analytics.avg_loss, dec!(20));
        assert_eq!(analytics.largest_win, dec!(30));
        assert_eq!(analytics.largest_loss, dec!(-30));
        assert_eq!(analytics.profit_factor, Some(1.0));

        assert_eq!(analytics.by_symbol["BTCUSDT"].profit, dec!(20));
        assert_eq!(analytics.by_symbol["ETHUSDT"].win_rate_pct(), dec!(50));
        assert_eq!(analytics.best_symbol(), Some(("BTCUSDT", dec!(20))));
        assert_eq!(analytics.daily.values().map(|d| d.trades).sum::<usize>(), 4);
    }

    #[test]
    fn test_no_losses() {
        let analytics =
            PerformanceAnalytics::from_closed(&[closed(1, "BTCUSDT", dec!(100), dec!(105))], 1);
        assert_eq!(analytics.profit_factor, None);
        assert_eq!(analytics.losing_trades, 0);
    }
}

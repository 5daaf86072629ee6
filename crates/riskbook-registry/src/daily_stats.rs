//! Daily trade counters and cumulative performance metrics.

use chrono::NaiveDate;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::handle::Realization;

/// Trade counters for one UTC date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub trades_opened: u32,
    pub trades_closed: u32,
    /// Full closes whose total realized P&L was positive
    pub winners: u32,
    pub losers: u32,
    /// Sum of positive realized slices
    pub gross_profit: Decimal,
    /// Sum of negative realized slices, as a positive amount
    pub gross_loss: Decimal,
}

impl DailyStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trades_opened: 0,
            trades_closed: 0,
            winners: 0,
            losers: 0,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
        }
    }

    /// Net realized P&L for the day.
    pub fn net_realized(&self) -> Decimal {
        self.gross_profit - self.gross_loss
    }

    /// Percentage of closed trades that were winners.
    pub fn win_rate_pct(&self) -> Decimal {
        if self.trades_closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winners * 100) / Decimal::from(self.trades_closed)
    }
}

/// Cumulative performance across all days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
}

impl PerformanceMetrics {
    pub fn net_profit(&self) -> Decimal {
        self.gross_profit - self.gross_loss
    }

    /// Winning trades as a percentage of all closed trades.
    pub fn success_rate_pct(&self) -> Decimal {
        if self.total_trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades) / Decimal::from(self.total_trades) * dec!(100)
    }

    /// Gross profit / gross loss. `None` when nothing has been lost yet.
    pub fn profit_factor(&self) -> Option<f64> {
        if self.gross_loss > Decimal::ZERO {
            (self.gross_profit / self.gross_loss).to_f64()
        } else {
            None
        }
    }
}

/// Daily counters keyed by UTC date plus running totals.
#[derive(Debug, Default)]
pub(crate) struct StatsLedger {
    days: BTreeMap<NaiveDate, DailyStats>,
    totals: PerformanceMetrics,
}

impl StatsLedger {
    pub(crate) fn record_open(&mut self, date: NaiveDate) {
        self.day_mut(date).trades_opened += 1;
    }

    /// Book `realization` under `date`, the day it was booked.
    pub(crate) fn record(&mut self, realization: &Realization, date: NaiveDate) {
        let pnl = realization.pnl;
        let day = self.days.entry(date).or_insert_with(|| DailyStats::new(date));

        if pnl > Decimal::ZERO {
            day.gross_profit += pnl;
            self.totals.gross_profit += pnl;
        } else if pnl < Decimal::ZERO {
            day.gross_loss += -pnl;
            self.totals.gross_loss += -pnl;
        }

        if let Some(total) = realization.closed_total {
            day.trades_closed += 1;
            self.totals.total_trades += 1;
            if total > Decimal::ZERO {
                day.winners += 1;
                self.totals.winning_trades += 1;
            } else {
                day.losers += 1;
                self.totals.losing_trades += 1;
            }
        }
    }

    pub(crate) fn day(&self, date: NaiveDate) -> DailyStats {
        self.days
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyStats::new(date))
    }

    pub(crate) fn totals(&self) -> PerformanceMetrics {
        self.totals.clone()
    }

    fn day_mut(&mut self, date: NaiveDate) -> &mut DailyStats {
        self.days.entry(date).or_insert_with(|| DailyStats::new(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn slice(pnl: Decimal, closed_total: Option<Decimal>) -> Realization {
        Realization {
            quantity: dec!(1),
            pnl,
            closed_total,
            at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_ledger_counts_winners_on_total() {
        let mut ledger = StatsLedger::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        ledger.record_open(date);

        // Partial profit then a losing remainder that still nets positive.
        ledger.record(&slice(dec!(300), None), date);
        ledger.record(&slice(dec!(-100), Some(dec!(200))), date);

        let day = ledger.day(date);
        assert_eq!(day.trades_opened, 1);
        assert_eq!(day.trades_closed, 1);
        assert_eq!(day.winners, 1);
        assert_eq!(day.gross_profit, dec!(300));
        assert_eq!(day.gross_loss, dec!(100));
        assert_eq!(day.net_realized(), dec!(200));
        assert_eq!(day.win_rate_pct(), dec!(100));
    }

    #[test]
    fn test_metrics_profit_factor() {
        let mut ledger = StatsLedger::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        ledger.record(&slice(dec!(600), Some(dec!(600))), date);
        ledger.record(&slice(dec!(-200), Some(dec!(-200))), date);

        let totals = ledger.totals();
        assert_eq!(totals.total_trades, 2);
        assert_eq!(totals.losing_trades, 1);
        assert_eq!(totals.net_profit(), dec!(400));
        assert_eq!(totals.success_rate_pct(), dec!(50));
        assert_eq!(totals.profit_factor(), Some(3.0));
    }

    #[test]
    fn test_unknown_day_is_empty() {
        let ledger = StatsLedger::default();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(ledger.day(date), DailyStats::new(date));
        assert_eq!(ledger.totals().profit_factor(), None);
    }
}

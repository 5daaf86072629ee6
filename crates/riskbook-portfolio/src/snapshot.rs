//! Point-in-time portfolio aggregation.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use riskbook_core::{Position, PositionSide, RiskLevel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate view of the open book.
///
/// Always recomputed from a consistent list of positions, never maintained
/// incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Sum of current values of all open positions
    pub total_exposure: Decimal,
    /// Exposure per symbol
    pub by_symbol: BTreeMap<String, Decimal>,
    pub long_exposure: Decimal,
    pub short_exposure: Decimal,
    /// Exposure per leverage bucket, keyed `lev_<n>`
    pub by_leverage: BTreeMap<String, Decimal>,
    pub unrealized_pnl: Decimal,
    /// Realized P&L already booked on positions that are still open
    pub realized_pnl: Decimal,
    /// Largest single-symbol exposure divided by total exposure
    pub concentration: f64,
    /// Net unrealized P&L relative to exposure, mapped to [0, 1]
    pub health: f64,
    pub risk_level: RiskLevel,
    pub open_positions: usize,
    pub stale_positions: usize,
    pub timestamp: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Aggregate `positions`. Closed positions in the slice are ignored.
    pub fn from_positions(positions: &[Position]) -> Self {
        let mut snapshot = Self::empty();

        for position in positions.iter().filter(|p| p.is_open()) {
            let value = position.current_value;
            snapshot.total_exposure += value;
            *snapshot
                .by_symbol
                .entry(position.symbol.clone())
                .or_insert(Decimal::ZERO) += value;
            *snapshot
                .by_leverage
                .entry(format!("lev_{}", position.leverage))
                .or_insert(Decimal::ZERO) += value;
            match position.side {
                PositionSide::Long => snapshot.long_exposure += value,
                PositionSide::Short => snapshot.short_exposure += value,
            }
            snapshot.unrealized_pnl += position.unrealized_pnl;
            snapshot.realized_pnl += position.realized_pnl;
            snapshot.open_positions += 1;
            if position.stale {
                snapshot.stale_positions += 1;
            }
        }

        if snapshot.total_exposure > Decimal::ZERO {
            let largest = snapshot
                .by_symbol
                .values()
                .copied()
                .max()
                .unwrap_or(Decimal::ZERO);
            snapshot.concentration = (largest / snapshot.total_exposure).to_f64().unwrap_or(0.0);
        }
        snapshot.health = portfolio_health(snapshot.unrealized_pnl, snapshot.total_exposure);
        snapshot.risk_level = RiskLevel::from_aggregate_score(
            0.7 * (1.0 - snapshot.health) + 0.3 * snapshot.concentration,
        );
        snapshot
    }

    fn empty() -> Self {
        Self {
            total_exposure: Decimal::ZERO,
            by_symbol: BTreeMap::new(),
            long_exposure: Decimal::ZERO,
            short_exposure: Decimal::ZERO,
            by_leverage: BTreeMap::new(),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            concentration: 0.0,
            health: 1.0,
            risk_level: RiskLevel::VeryLow,
            open_positions: 0,
            stale_positions: 0,
            timestamp: Utc::now(),
        }
    }

    /// Net long minus short exposure.
    pub fn net_exposure(&self) -> Decimal {
        self.long_exposure - self.short_exposure
    }

    /// Largest symbol and its exposure.
    pub fn largest_symbol(&self) -> Option<(&str, Decimal)> {
        self.by_symbol
            .iter()
            .max_by_key(|(_, value)| **value)
            .map(|(symbol, value)| (symbol.as_str(), *value))
    }
}

/// Health of the open book in [0, 1]: 0.5 at break-even, moving 2x the
/// unrealized P&L ratio. An empty book is perfectly healthy.
pub fn portfolio_health(unrealized_pnl: Decimal, total_exposure: Decimal) -> f64 {
    if total_exposure <= Decimal::ZERO {
        return 1.0;
    }
    let ratio = (unrealized_pnl / total_exposure).to_f64().unwrap_or(0.0);
    (0.5 + ratio * 2.0).clamp(0.0, 1.0)
}

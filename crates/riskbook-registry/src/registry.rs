//! The position registry.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use riskbook_core::{
    CloseIntent, CloseReason, ExecutionReport, OpenPosition, Position, PositionId, RegistryError,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::daily_stats::{DailyStats, PerformanceMetrics, StatsLedger};
use crate::handle::{PartialCloseOutcome, PositionMut, Realization};

type Slot = Arc<Mutex<Position>>;

/// Canonical set of open and closed positions.
///
/// Locking discipline: the index lock is never held while waiting on a
/// position lock taken by `mutate`, and a position lock is never held while
/// taking the index write lock. The closed-set lock may be taken under a
/// position lock but never the other way round.
#[derive(Debug)]
pub struct PositionRegistry {
    sequence: AtomicU64,
    open: RwLock<HashMap<PositionId, Slot>>,
    closed: RwLock<Vec<Position>>,
    ledger: Mutex<StatsLedger>,
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(1),
            open: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
            ledger: Mutex::new(StatsLedger::default()),
        }
    }

    /// Register a newly filled position.
    pub fn open(&self, params: OpenPosition) -> Result<PositionId, RegistryError> {
        self.open_at(params, Utc::now())
    }

    /// Register a newly filled position with an explicit open time.
    pub fn open_at(
        &self,
        params: OpenPosition,
        opened_at: DateTime<Utc>,
    ) -> Result<PositionId, RegistryError> {
        validate_open(&params)?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = PositionId::new(sequence, params.symbol.clone(), params.side);
        let position = Position::new(id.clone(), &params, opened_at);

        self.open.write().insert(id.clone(), Arc::new(Mutex::new(position)));
        self.ledger.lock().record_open(opened_at.date_naive());

        info!(
            position = %id,
            quantity = %params.quantity,
            entry = %params.entry_price,
            leverage = params.leverage,
            timeframe = %params.timeframe,
            "Position opened"
        );
        Ok(id)
    }

    /// Get a position by id, open or closed.
    pub fn get(&self, id: &PositionId) -> Result<Position, RegistryError> {
        if let Some(slot) = self.slot(id) {
            let position = slot.lock();
            if position.is_open() {
                return Ok(position.clone());
            }
        }
        self.closed
            .read()
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Point-in-time copy of every open position, ordered by open sequence.
    pub fn list_open(&self, symbol: Option<&str>) -> Vec<Position> {
        let index = self.open.read();
        let mut positions: Vec<Position> = index
            .iter()
            .filter(|(id, _)| symbol.map_or(true, |s| id.symbol == s))
            .filter_map(|(_, slot)| {
                let position = slot.lock();
                position.is_open().then(|| position.clone())
            })
            .collect();
        drop(index);

        positions.sort_by(|a, b| a.id.cmp(&b.id));
        positions
    }

    /// Closed positions, optionally filtered by symbol and closed within the last `since_days`.
    pub fn list_closed(&self, symbol: Option<&str>, since_days: Option<u32>) -> Vec<Position> {
        let cutoff = since_days.map(|days| Utc::now() - Duration::days(i64::from(days)));
        self.closed
            .read()
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .filter(|p| match (cutoff, p.closed_at) {
                (Some(cutoff), Some(closed_at)) => closed_at >= cutoff,
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// Ids of open positions, ordered by open sequence.
    pub fn open_ids(&self, symbol: Option<&str>) -> Vec<PositionId> {
        let mut ids: Vec<PositionId> = self
            .open
            .read()
            .keys()
            .filter(|id| symbol.map_or(true, |s| id.symbol == s))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }

    /// Apply an atomic read-modify-write to exactly one open position.
    ///
    /// If the closure closes the position it is moved to the closed set
    /// before this call returns.
    pub fn mutate<R, F>(&self, id: &PositionId, f: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut PositionMut<'_>) -> R,
    {
        let slot = self
            .slot(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let mut position = slot.lock();
        if !position.is_open() {
            return Err(RegistryError::NotFound(id.clone()));
        }

        let mut handle = PositionMut::new(&mut *position);
        let result = f(&mut handle);
        let realizations = handle.into_realizations();
        let retired = !position.is_open();
        if retired {
            // Visible in the closed set before the slot unlocks
            self.closed.write().push(position.clone());
        }
        drop(position);

        self.record(&realizations);
        if retired {
            self.retire(id);
        }
        Ok(result)
    }

    /// Fully close a position at its current price.
    ///
    /// Returns the realized P&L of the closing slice. A second close of the
    /// same id returns `NotFound`.
    pub fn close(&self, id: &PositionId, reason: CloseReason) -> Result<Decimal, RegistryError> {
        self.mutate(id, |position| position.close(reason, Utc::now()))?
    }

    /// Close `fraction` of a position unless `rung_key` already fired.
    pub fn partial_close(
        &self,
        id: &PositionId,
        fraction: Decimal,
        rung_key: &str,
    ) -> Result<PartialCloseOutcome, RegistryError> {
        self.mutate(id, |position| position.partial_close(fraction, rung_key, Utc::now()))?
    }

    /// Flag every open position on `symbol` as stale. Returns how many were flagged.
    pub fn mark_stale(&self, symbol: &str) -> usize {
        self.open_ids(Some(symbol))
            .iter()
            .filter_map(|id| {
                self.mutate(id, |position| {
                    let newly = !position.stale;
                    position.mark_stale();
                    newly
                })
                .ok()
            })
            .filter(|newly| *newly)
            .count()
    }

    /// Book the difference between an optimistic close and the reported fill.
    ///
    /// Returns the realized P&L delta applied to the position.
    pub fn reconcile_fill(
        &self,
        intent: &CloseIntent,
        report: &ExecutionReport,
    ) -> Result<Decimal, RegistryError> {
        let delta = report.price_improvement(intent) * report.filled_quantity;
        if delta == Decimal::ZERO {
            return Ok(delta);
        }
        let at = report.executed_at;

        match self.mutate(&intent.position_id, |position| position.adjust_realized(delta, at)) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                let mut closed = self.closed.write();
                let position = closed
                    .iter_mut()
                    .rev()
                    .find(|p| p.id == intent.position_id)
                    .ok_or(err)?;
                position.adjust_realized(delta, at);
                drop(closed);
                self.record(&[Realization {
                    quantity: Decimal::ZERO,
                    pnl: delta,
                    closed_total: None,
                    at,
                }]);
            }
            Err(err) => return Err(err),
        }

        debug!(position = %intent.position_id, delta = %delta, "Fill reconciled");
        Ok(delta)
    }

    /// Counters for one UTC date.
    pub fn daily_stats(&self, date: NaiveDate) -> DailyStats {
        self.ledger.lock().day(date)
    }

    /// Net realized P&L booked on `date`.
    pub fn daily_realized(&self, date: NaiveDate) -> Decimal {
        self.ledger.lock().day(date).net_realized()
    }

    /// Cumulative metrics since the registry was created.
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.ledger.lock().totals()
    }

    fn slot(&self, id: &PositionId) -> Option<Slot> {
        self.open.read().get(id).cloned()
    }

    fn record(&self, realizations: &[Realization]) {
        if realizations.is_empty() {
            return;
        }
        // Keyed by booking time so a lagging feed still counts toward today
        let today = Utc::now().date_naive();
        let mut ledger = self.ledger.lock();
        for realization in realizations {
            ledger.record(realization, today);
        }
    }

    fn retire(&self, id: &PositionId) {
        self.open.write().remove(id);
        if let Some(position) = self.closed.read().iter().rev().find(|p| &p.id == id) {
            info!(
                position = %position.id,
                reason = ?position.close_reason,
                realized_pnl = %position.realized_pnl,
                "Position closed"
            );
        }
    }
}

fn validate_open(params: &OpenPosition) -> Result<(), RegistryError> {
    if params.quantity <= Decimal::ZERO {
        return Err(RegistryError::InvalidQuantity(format!(
            "quantity must be positive, got {}",
            params.quantity
        )));
    }
    if params.entry_price <= Decimal::ZERO {
        return Err(RegistryError::InvalidPrice(format!(
            "entry price must be positive, got {}",
            params.entry_price
        )));
    }
    for (name, price) in [("stop loss", params.stop_loss), ("take profit", params.take_profit)] {
        if let Some(price) = price {
            if price <= Decimal::ZERO {
                return Err(RegistryError::InvalidPrice(format!(
                    "{} must be positive, got {}",
                    name, price
                )));
            }
        }
    }
    if params.leverage < 1 {
        return Err(RegistryError::InvalidLeverage(params.leverage));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskbook_core::{IntentAction, PositionSide, PositionStatus};
    use rust_decimal_macros::dec;

    fn btc_long(registry: &PositionRegistry) -> PositionId {
        registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)).with_stop_loss(dec!(49000)))
            .unwrap()
    }

    #[test]
    fn test_open_and_get() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);

        let position = registry.get(&id).unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.current_value, dec!(50000));
        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.daily_stats(Utc::now().date_naive()).trades_opened, 1);
    }

    #[test]
    fn test_open_rejects_invalid_params() {
        let registry = PositionRegistry::new();
        let err = registry
            .open(OpenPosition::long("BTCUSDT", Decimal::ZERO, dec!(50000)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidQuantity(_)));

        let err = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)).with_leverage(0))
            .unwrap_err();
        assert_eq!(err, RegistryError::InvalidLeverage(0));
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn test_ids_are_unique_per_symbol_side() {
        let registry = PositionRegistry::new();
        let a = btc_long(&registry);
        let b = btc_long(&registry);
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(registry.list_open(Some("BTCUSDT")).len(), 2);
        assert!(registry.list_open(Some("ETHUSDT")).is_empty());
    }

    #[test]
    fn test_close_moves_to_history() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);
        registry
            .mutate(&id, |p| p.update_price(dec!(49000), Utc::now()))
            .unwrap()
            .unwrap();

        let realized = registry.close(&id, CloseReason::StopLoss).unwrap();
        assert_eq!(realized, dec!(-1000));
        assert_eq!(registry.open_count(), 0);

        let closed = registry.list_closed(None, Some(1));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::Closed);
        assert_eq!(closed[0].realized_pnl, dec!(-1000));

        // Second close never credits again.
        assert!(registry.close(&id, CloseReason::StopLoss).unwrap_err().is_not_found());
        assert_eq!(registry.get(&id).unwrap().realized_pnl, dec!(-1000));

        let stats = registry.daily_stats(Utc::now().date_naive());
        assert_eq!(stats.trades_closed, 1);
        assert_eq!(stats.losers, 1);
        assert_eq!(registry.daily_realized(Utc::now().date_naive()), dec!(-1000));
    }

    #[test]
    fn test_partial_close_through_registry() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);
        registry
            .mutate(&id, |p| p.update_price(dec!(51500), Utc::now()))
            .unwrap()
            .unwrap();

        let outcome = registry.partial_close(&id, dec!(0.3), "ladder_3").unwrap();
        assert_eq!(outcome.realized(), dec!(450));
        assert_eq!(
            registry.partial_close(&id, dec!(0.3), "ladder_3").unwrap(),
            PartialCloseOutcome::AlreadyApplied
        );

        let position = registry.get(&id).unwrap();
        assert_eq!(position.quantity, dec!(0.7));
        assert_eq!(position.status, PositionStatus::PartiallyClosed);

        let outcome = registry.partial_close(&id, dec!(1), "ladder_5").unwrap();
        assert!(matches!(outcome, PartialCloseOutcome::ClosedFully { .. }));
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.performance_metrics().winning_trades, 1);
    }

    #[test]
    fn test_mark_stale_flags_once() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);
        assert_eq!(registry.mark_stale("BTCUSDT"), 1);
        assert_eq!(registry.mark_stale("BTCUSDT"), 0);
        assert!(registry.get(&id).unwrap().stale);

        registry
            .mutate(&id, |p| p.update_price(dec!(50100), Utc::now()))
            .unwrap()
            .unwrap();
        assert!(!registry.get(&id).unwrap().stale);
    }

    #[test]
    fn test_reconcile_closed_position() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);
        registry.close(&id, CloseReason::Manual("test".into())).unwrap();

        let intent = CloseIntent::new(
            id.clone(),
            IntentAction::Close,
            dec!(1),
            dec!(50000),
            CloseReason::Manual("test".into()),
        );
        let report = ExecutionReport {
            intent_id: intent.intent_id,
            position_id: id.clone(),
            filled_quantity: dec!(1),
            fill_price: dec!(49990),
            executed_at: Utc::now(),
        };

        assert_eq!(registry.reconcile_fill(&intent, &report).unwrap(), dec!(-10));
        assert_eq!(registry.get(&id).unwrap().realized_pnl, dec!(-10));
        assert_eq!(registry.daily_realized(Utc::now().date_naive()), dec!(-10));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = PositionRegistry::new();
        let id = PositionId::new(99, "BTCUSDT", PositionSide::Short);
        assert!(registry.get(&id).unwrap_err().is_not_found());
        assert!(registry.mutate(&id, |_| ()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_closing_position_is_never_missing() {
        let registry = PositionRegistry::new();
        let ids: Vec<PositionId> = (0..200).map(|_| btc_long(&registry)).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for id in &ids {
                    registry.close(id, CloseReason::Manual("sweep".into())).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..5 {
                    for id in &ids {
                        assert!(registry.get(id).is_ok(), "{} missing from both sets", id);
                    }
                }
            });
        });

        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.list_closed(None, None).len(), 200);
    }

    #[test]
    fn test_late_tick_close_counts_toward_today() {
        let registry = PositionRegistry::new();
        let id = btc_long(&registry);
        // Feed replaying a tick from three days ago
        let lagging = Utc::now() - Duration::days(3);
        registry
            .mutate(&id, |p| {
                p.update_price(dec!(49000), lagging)?;
                p.close(CloseReason::StopLoss, lagging)
            })
            .unwrap()
            .unwrap();

        let today = Utc::now().date_naive();
        assert_eq!(registry.daily_realized(today), dec!(-1000));
        assert_eq!(registry.daily_stats(today).trades_closed, 1);
        assert_eq!(registry.daily_realized(lagging.date_naive()), Decimal::ZERO);
        assert_eq!(registry.get(&id).unwrap().closed_at, Some(lagging));
    }

    #[tokio::test]
    async fn test_concurrent_mutations_do_not_interleave() {
        let registry = Arc::new(PositionRegistry::new());
        let id = btc_long(&registry);

        let mut handles = Vec::new();
        for step in 0..16u32 {
            let registry = registry.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .mutate(&id, |p| {
                        let price = dec!(50000) + Decimal::from(step);
                        p.update_price(price, Utc::now()).unwrap();
                        p.current_value == p.quantity * p.current_price
                    })
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }
}

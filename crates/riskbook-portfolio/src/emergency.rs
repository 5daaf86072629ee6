//! Emergency liquidation of the whole book.

use chrono::{DateTime, Utc};
use riskbook_core::{
    CloseIntent, CloseReason, ExecutionGateway, IntentAction, PositionId, RegistryError,
};
use riskbook_gateway::RetryPolicy;
use riskbook_registry::PositionRegistry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A position the controller could not close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyFailure {
    pub position_id: PositionId,
    pub error: String,
}

/// Tally of an emergency close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub reason: String,
    /// Positions a close was attempted for
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Positions that were already closed when the controller reached them
    pub skipped: usize,
    pub closed: Vec<PositionId>,
    pub failures: Vec<EmergencyFailure>,
    pub total_realized_pnl: Decimal,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EmergencyReport {
    fn new(reason: &str) -> Self {
        let now = Utc::now();
        Self {
            reason: reason.to_string(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            closed: Vec::new(),
            failures: Vec::new(),
            total_realized_pnl: Decimal::ZERO,
            started_at: now,
            finished_at: now,
        }
    }

    /// Ids of positions left open because their close failed.
    pub fn failed_ids(&self) -> Vec<PositionId> {
        self.failures.iter().map(|f| f.position_id.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Closes every open position through the execution gateway.
///
/// Each close is attempted independently; a failure leaves that position open
/// and the batch continues. A position is claimed before its gateway call and
/// booked at the fill, so no other path can close it in between. Concurrent
/// calls run one after another.
pub struct EmergencyController {
    gateway: Arc<dyn ExecutionGateway>,
    retry: RetryPolicy,
    running: Mutex<()>,
}

impl EmergencyController {
    pub fn new(gateway: Arc<dyn ExecutionGateway>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            retry,
            running: Mutex::new(()),
        }
    }

    /// Whether a liquidation is in progress.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Attempt a full close of every open position.
    pub async fn close_all(&self, registry: &PositionRegistry, reason: &str) -> EmergencyReport {
        let _guard = self.running.lock().await;
        let mut report = EmergencyReport::new(reason);
        let ids = registry.open_ids(None);

        warn!(
            reason,
            positions = ids.len(),
            gateway = self.gateway.name(),
            "Emergency close of all positions"
        );

        for id in ids {
            // Claim the close so triggers and manual closes keep off it while
            // the gateway call is in flight
            let claimed = registry
                .mutate(&id, |position| {
                    position.claim_close()?;
                    Ok::<_, RegistryError>((position.quantity, position.current_price))
                })
                .and_then(|result| result);
            let (quantity, price) = match claimed {
                Ok(claimed) => claimed,
                Err(err) => {
                    debug!(position = %id, error = %err, "Position no longer closable, skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            report.attempted += 1;

            let intent = CloseIntent::new(
                id.clone(),
                IntentAction::Close,
                quantity,
                price,
                CloseReason::Emergency(reason.to_string()),
            );

            let fill = match self.retry.execute(self.gateway.as_ref(), &intent).await {
                Ok(fill) => fill,
                Err(err) => {
                    error!(position = %id, error = %err, "Emergency close failed");
                    let _ = registry.mutate(&id, |position| position.release_close());
                    report.failed += 1;
                    report.failures.push(EmergencyFailure {
                        position_id: id,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            let booked = registry
                .mutate(&id, |position| {
                    position.release_close();
                    position.update_price(fill.fill_price, fill.executed_at)?;
                    position.close(intent.reason.clone(), fill.executed_at)
                })
                .and_then(|result| result);

            match booked {
                Ok(pnl) => {
                    report.succeeded += 1;
                    report.total_realized_pnl += pnl;
                    report.closed.push(id);
                }
                Err(err) => {
                    error!(position = %id, error = %err, "Emergency fill could not be booked");
                    report.failed += 1;
                    report.failures.push(EmergencyFailure {
                        position_id: id,
                        error: err.to_string(),
                    });
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            reason,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            realized = %report.total_realized_pnl,
            "Emergency close finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskbook_core::{GatewayError, OpenPosition};
    use riskbook_gateway::PaperGateway;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(100), 2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_close_all_continues_past_failures() {
        let registry = PositionRegistry::new();
        let ids: Vec<PositionId> = (0..3)
            .map(|i| {
                registry
                    .open(OpenPosition::long("BTCUSDT", dec!(0.01), dec!(50000) + Decimal::from(i)))
                    .unwrap()
            })
            .collect();

        let gateway = Arc::new(PaperGateway::new());
        gateway.fail_position(ids[1].clone(), GatewayError::Rejected("halted".into()));
        let controller = EmergencyController::new(gateway.clone(), fast_retry());

        let report = controller.close_all(&registry, "test").await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids(), vec![ids[1].clone()]);
        assert!(!report.is_complete());

        let left_open = registry.get(&ids[1]).unwrap();
        assert!(left_open.is_open());
        assert!(!left_open.close_pending);
        assert_eq!(registry.open_count(), 1);
        assert!(registry.close(&ids[1], CloseReason::Manual("retry".into())).is_ok());
    }

    fn slow_controller() -> (Arc<PaperGateway>, Arc<EmergencyController>) {
        let gateway = Arc::new(PaperGateway::new().with_latency(Duration::from_millis(200)));
        let retry = RetryPolicy::new(Duration::from_secs(2), 1);
        (gateway.clone(), Arc::new(EmergencyController::new(gateway, retry)))
    }

    #[tokio::test]
    async fn test_position_closed_mid_batch_is_skipped() {
        let registry = Arc::new(PositionRegistry::new());
        let first = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
            .unwrap();
        let second = registry
            .open(OpenPosition::long("ETHUSDT", dec!(2), dec!(3000)))
            .unwrap();
        let (gateway, controller) = slow_controller();

        let batch = {
            let registry = registry.clone();
            tokio::spawn(async move { controller.close_all(&registry, "halt").await })
        };
        // First close is at the gateway; the second is closed elsewhere
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.close(&second, CloseReason::Manual("operator".into())).unwrap();

        let report = batch.await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.closed, vec![first]);
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_close_cannot_be_taken_over() {
        let registry = Arc::new(PositionRegistry::new());
        let id = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
            .unwrap();
        let (gateway, controller) = slow_controller();

        let batch = {
            let registry = registry.clone();
            tokio::spawn(async move { controller.close_all(&registry, "halt").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = registry.close(&id, CloseReason::Manual("operator".into())).unwrap_err();
        assert!(err.is_close_pending());

        let report = batch.await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(gateway.executed().len(), 1);
        let closed = registry.get(&id).unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Emergency("halt".into())));
        assert!(!closed.close_pending);
    }

    #[tokio::test]
    async fn test_books_at_fill_price() {
        let registry = PositionRegistry::new();
        let id = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
            .unwrap();

        // 0.1% adverse slippage on a long close
        let gateway = Arc::new(PaperGateway::new().with_slippage(dec!(0.1)));
        let controller = EmergencyController::new(gateway, fast_retry());

        let report = controller.close_all(&registry, "drill").await;
        assert_eq!(report.total_realized_pnl, dec!(-50));
        assert_eq!(report.closed, vec![id.clone()]);

        let closed = registry.get(&id).unwrap();
        assert!(!closed.is_open());
        assert_eq!(closed.realized_pnl, dec!(-50));
        assert_eq!(closed.close_reason, Some(CloseReason::Emergency("drill".into())));
    }

    #[tokio::test]
    async fn test_empty_book() {
        let registry = PositionRegistry::new();
        let controller = EmergencyController::new(Arc::new(PaperGateway::new()), fast_retry());
        let report = controller.close_all(&registry, "noop").await;
        assert_eq!(report.attempted, 0);
        assert!(report.is_complete());
        assert!(!controller.is_running());
    }
}

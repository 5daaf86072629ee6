//! Paper execution gateway for simulation and tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use riskbook_core::{
    CloseIntent, ExecutionGateway, ExecutionReport, GatewayError, PositionId, Side,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Paper gateway that fills every intent at the expected price plus slippage.
///
/// Failures can be injected per position (every call fails) or queued for the
/// next calls (each queued error is consumed once).
pub struct PaperGateway {
    slippage_pct: Decimal,
    latency: Option<Duration>,
    failing: Mutex<HashMap<PositionId, GatewayError>>,
    queued: Mutex<VecDeque<GatewayError>>,
    executed: Mutex<Vec<CloseIntent>>,
    calls: Mutex<u64>,
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperGateway {
    /// Create a paper gateway with no slippage.
    pub fn new() -> Self {
        Self {
            slippage_pct: Decimal::ZERO,
            latency: None,
            failing: Mutex::new(HashMap::new()),
            queued: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    /// Set slippage percentage applied against the closing side.
    pub fn with_slippage(mut self, slippage_pct: Decimal) -> Self {
        self.slippage_pct = slippage_pct;
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call for `position_id` with `error`.
    pub fn fail_position(&self, position_id: PositionId, error: GatewayError) {
        self.failing.lock().insert(position_id, error);
    }

    /// Stop failing calls for `position_id`.
    pub fn recover_position(&self, position_id: &PositionId) {
        self.failing.lock().remove(position_id);
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        self.queued.lock().push_back(error);
    }

    /// Intents filled so far.
    pub fn executed(&self) -> Vec<CloseIntent> {
        self.executed.lock().clone()
    }

    /// Number of `execute` calls, including failed ones.
    pub fn call_count(&self) -> u64 {
        *self.calls.lock()
    }

    fn fill_price(&self, intent: &CloseIntent) -> Decimal {
        let slip = self.slippage_pct / dec!(100);
        match intent.side {
            Side::Buy => intent.expected_price * (Decimal::ONE + slip),
            Side::Sell => intent.expected_price * (Decimal::ONE - slip),
        }
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn execute(&self, intent: &CloseIntent) -> Result<ExecutionReport, GatewayError> {
        *self.calls.lock() += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.queued.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing.lock().get(&intent.position_id).cloned() {
            return Err(error);
        }

        let fill_price = self.fill_price(intent);
        debug!(
            position = %intent.position_id,
            side = %intent.side,
            quantity = %intent.quantity,
            fill = %fill_price,
            "Paper fill"
        );
        self.executed.lock().push(intent.clone());

        Ok(ExecutionReport {
            intent_id: intent.intent_id,
            position_id: intent.position_id.clone(),
            filled_quantity: intent.quantity,
            fill_price,
            executed_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

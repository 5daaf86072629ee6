//! Close intents emitted to the execution gateway and the reports it returns.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{PositionId, Side};

/// Why a position (or a slice of it) was closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Price crossed the stop-loss
    StopLoss,
    /// Price crossed the take-profit
    TakeProfit,
    /// A ladder rung closed a fraction of the position
    PartialClose { rung: String },
    /// A partial close would have left nothing open
    FullClose,
    /// Operator or caller request
    Manual(String),
    /// Emergency liquidation of the whole book
    Emergency(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::PartialClose { rung } => write!(f, "partial_close_{}", rung),
            CloseReason::FullClose => write!(f, "full_close"),
            CloseReason::Manual(reason) => write!(f, "manual_{}", reason),
            CloseReason::Emergency(reason) => write!(f, "emergency_{}", reason),
        }
    }
}

/// Kind of execution requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    Close,
    PartialClose,
}

/// Request for the execution gateway to close all or part of a position.
///
/// The engine books the close optimistically at `expected_price`; the
/// gateway's [`ExecutionReport`] is used to reconcile any price difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseIntent {
    pub intent_id: Uuid,
    pub position_id: PositionId,
    pub symbol: String,
    /// Order side that executes the close
    pub side: Side,
    pub action: IntentAction,
    pub quantity: Decimal,
    pub expected_price: Decimal,
    pub reason: CloseReason,
    pub created_at: DateTime<Utc>,
}

impl CloseIntent {
    pub fn new(
        position_id: PositionId,
        action: IntentAction,
        quantity: Decimal,
        expected_price: Decimal,
        reason: CloseReason,
    ) -> Self {
        Self {
            intent_id: Uuid::new_v4(),
            symbol: position_id.symbol.clone(),
            side: position_id.side.closing_side(),
            position_id,
            action,
            quantity,
            expected_price,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Fill reported by the execution gateway for a close intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub intent_id: Uuid,
    pub position_id: PositionId,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Difference between the fill and the optimistic booking, per unit,
    /// signed so a positive value means the fill was better for the position.
    pub fn price_improvement(&self, intent: &CloseIntent) -> Decimal {
        (self.fill_price - intent.expected_price) * intent.position_id.side.sign()
    }
}

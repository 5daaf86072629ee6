//! Events published by the engine.

use riskbook_core::{CloseIntent, ExecutionReport, PositionId, PositionSide};
use riskbook_monitor::RiskAlert;
use riskbook_portfolio::{EmergencyReport, SystemRiskAssessment};
use riskbook_risk::TriggerEvent;
use rust_decimal::Decimal;
use serde::Serialize;

/// Something observers of the engine may want to react to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    PositionOpened {
        position_id: PositionId,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
    },
    Trigger {
        position_id: PositionId,
        event: TriggerEvent,
    },
    IntentExecuted {
        intent: CloseIntent,
        report: ExecutionReport,
        /// Realized P&L correction booked from the fill
        reconciled: Decimal,
    },
    IntentFailed {
        intent: CloseIntent,
        error: String,
    },
    PositionsStale {
        symbol: String,
        count: usize,
    },
    RiskAlert(RiskAlert),
    SystemRisk(SystemRiskAssessment),
    Emergency(EmergencyReport),
}

impl EngineEvent {
    /// Position the event refers to, if any.
    pub fn position_id(&self) -> Option<&PositionId> {
        match self {
            EngineEvent::PositionOpened { position_id, .. }
            | EngineEvent::Trigger { position_id, .. } => Some(position_id),
            EngineEvent::IntentExecuted { intent, .. } | EngineEvent::IntentFailed { intent, .. } => {
                Some(&intent.position_id)
            }
            EngineEvent::RiskAlert(alert) => Some(&alert.position_id),
            _ => None,
        }
    }
}

//! Trigger evaluation, risk scoring and pre-trade validation.
//!
//! Provides the per-tick trigger state machine, the composite position risk
//! assessor, the order validator and position sizing.

mod assessor;
mod position_sizer;
mod triggers;
mod validator;

pub use assessor::{AssessorConfig, RiskAssessment, RiskAssessor, RiskComponents};
pub use position_sizer::{floor_to_increment, PositionSizer};
pub use triggers::{LadderRung, TriggerBook, TriggerConfig, TriggerEvaluator, TriggerEvent, TriggerOutcome};
pub use validator::{BookState, OrderValidator, RiskLimits, ValidationCheck, ValidationResult};

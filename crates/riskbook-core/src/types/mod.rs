//! Core data types for the position and risk engine.

mod execution;
mod market;
mod order;
mod position;
mod risk;
mod timeframe;

pub use execution::{CloseIntent, CloseReason, ExecutionReport, IntentAction};
pub use market::{MarketConditions, MarketSnapshot, PriceTick};
pub use order::{OrderProposal, OrderType, Side};
pub use position::{OpenPosition, Position, PositionId, PositionSide, PositionStatus};
pub use risk::{RecommendedAction, RiskLevel};
pub use timeframe::Timeframe;

//! Execution gateway adapters.
//!
//! The engine never talks to an exchange directly. It hands close intents to
//! an [`ExecutionGateway`](riskbook_core::ExecutionGateway) through a
//! [`RetryPolicy`] that bounds each call with a timeout.

mod paper;
mod retry;

pub use paper::PaperGateway;
pub use retry::RetryPolicy;

//! Logging setup and risk alert tracking.

mod alerts;
mod logging;

pub use alerts::{RiskAlert, RiskAlertMonitor};
pub use logging::setup_logging;

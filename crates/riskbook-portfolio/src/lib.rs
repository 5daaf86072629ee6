//! Portfolio aggregation, system risk and emergency liquidation.

mod analytics;
mod emergency;
mod risk_report;
mod snapshot;
mod system_risk;

pub use analytics::{BucketPerformance, PerformanceAnalytics};
pub use emergency::{EmergencyController, EmergencyFailure, EmergencyReport};
pub use risk_report::RiskReport;
pub use snapshot::{portfolio_health, PortfolioSnapshot};
pub use system_risk::{assess_system_risk, LiquidityCondition, RiskFactor, SystemRiskAssessment};

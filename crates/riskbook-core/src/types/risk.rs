//! Risk levels and recommended actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-level ordinal risk scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Discretize a position risk score in [0, 1].
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::VeryHigh
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }

    /// Discretize an aggregate (system or book-wide) score.
    ///
    /// Aggregate scores use lower cut-offs than single positions.
    pub fn from_aggregate_score(score: f64) -> Self {
        if score >= 0.7 {
            RiskLevel::VeryHigh
        } else if score >= 0.5 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::VeryHigh)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::VeryLow => "VERY_LOW",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::VeryHigh => "VERY_HIGH",
        };
        write!(f, "{}", s)
    }
}

/// Action recommended for a position after assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Hold,
    Reduce,
    Close,
    Hedge,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendedAction::Hold => "HOLD",
            RecommendedAction::Reduce => "REDUCE",
            RecommendedAction::Close => "CLOSE",
            RecommendedAction::Hedge => "HEDGE",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_thresholds() {
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.19), RiskLevel::VeryLow);
    }

    #[test]
    fn test_aggregate_thresholds() {
        assert_eq!(RiskLevel::from_aggregate_score(0.7), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_aggregate_score(0.55), RiskLevel::High);
        assert_eq!(RiskLevel::from_aggregate_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_aggregate_score(0.1), RiskLevel::VeryLow);
    }

    #[test]
    fn test_ordering() {
        assert!(RiskLevel::VeryHigh > RiskLevel::High);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High.is_elevated());
        assert!(!RiskLevel::Medium.is_elevated());
    }
}

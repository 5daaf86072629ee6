//! System-wide risk assessment.

use chrono::{DateTime, Utc};
use riskbook_core::{MarketConditions, Position, RiskLevel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::portfolio_health;

/// Market liquidity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityCondition {
    High,
    Normal,
    Low,
}

impl LiquidityCondition {
    /// Classify from average spread (percent) and average volume.
    pub fn classify(average_spread: f64, average_volume: f64) -> Self {
        if average_spread < 0.005 && average_volume > 500_000.0 {
            LiquidityCondition::High
        } else if average_spread < 0.02 && average_volume > 100_000.0 {
            LiquidityCondition::Normal
        } else {
            LiquidityCondition::Low
        }
    }
}

impl fmt::Display for LiquidityCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityCondition::High => write!(f, "high"),
            LiquidityCondition::Normal => write!(f, "normal"),
            LiquidityCondition::Low => write!(f, "low"),
        }
    }
}

/// A condition that raised system risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    HighMarketVolatility,
    LowPortfolioHealth,
    LowLiquidity,
}

impl RiskFactor {
    /// Action recommended when this factor is present.
    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskFactor::HighMarketVolatility => "Reduce position sizes",
            RiskFactor::LowPortfolioHealth => "Rebalance the portfolio",
            RiskFactor::LowLiquidity => "Avoid large positions",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFactor::HighMarketVolatility => write!(f, "high market volatility"),
            RiskFactor::LowPortfolioHealth => write!(f, "low portfolio health"),
            RiskFactor::LowLiquidity => write!(f, "low liquidity"),
        }
    }
}

/// Result of a system risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRiskAssessment {
    pub level: RiskLevel,
    pub score: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub recommended_actions: Vec<String>,
    /// Market volatility estimate in [0, 1]
    pub market_volatility: f64,
    pub portfolio_health: f64,
    pub liquidity: LiquidityCondition,
    pub timestamp: DateTime<Utc>,
}

impl SystemRiskAssessment {
    /// Whether the book should be liquidated.
    pub fn requires_emergency(&self) -> bool {
        self.level == RiskLevel::VeryHigh
    }
}

const HIGH_VOLATILITY: f64 = 0.8;
const LOW_HEALTH: f64 = 0.5;

/// Combine market volatility, portfolio health and liquidity into one level.
pub fn assess_system_risk(
    conditions: &MarketConditions,
    open_positions: &[Position],
) -> SystemRiskAssessment {
    let market_volatility = market_volatility(conditions);
    let (exposure, unrealized) = open_positions
        .iter()
        .filter(|p| p.is_open())
        .fold((Decimal::ZERO, Decimal::ZERO), |(value, pnl), p| {
            (value + p.current_value, pnl + p.unrealized_pnl)
        });
    let health = portfolio_health(unrealized, exposure);
    let liquidity = LiquidityCondition::classify(conditions.average_spread, conditions.average_volume);

    let mut risk_factors = Vec::new();
    if market_volatility > HIGH_VOLATILITY {
        risk_factors.push(RiskFactor::HighMarketVolatility);
    }
    if health < LOW_HEALTH {
        risk_factors.push(RiskFactor::LowPortfolioHealth);
    }
    if liquidity == LiquidityCondition::Low {
        risk_factors.push(RiskFactor::LowLiquidity);
    }

    let score =
        risk_factors.len() as f64 * 0.3 + market_volatility * 0.4 + (1.0 - health) * 0.3;

    SystemRiskAssessment {
        level: RiskLevel::from_aggregate_score(score),
        score,
        recommended_actions: risk_factors
            .iter()
            .map(|f| f.recommendation().to_string())
            .collect(),
        risk_factors,
        market_volatility,
        portfolio_health: health,
        liquidity,
        timestamp: Utc::now(),
    }
}

/// Mean of realized volatility, VIX/100 and fear-greed/100, capped at 1.
fn market_volatility(conditions: &MarketConditions) -> f64 {
    let indicators = [
        conditions.average_volatility,
        conditions.vix_index / 100.0,
        conditions.fear_greed_index / 100.0,
    ];
    let mean = indicators.iter().sum::<f64>() / indicators.len() as f64;
    mean.clamp(0.0, 1.0)
}

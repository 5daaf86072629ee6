//! Composite per-position risk scoring.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use riskbook_core::{MarketSnapshot, Position, PositionId, RecommendedAction, RiskLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const WEIGHT_PNL: f64 = 0.30;
const WEIGHT_EXPOSURE: f64 = 0.25;
const WEIGHT_VOLATILITY: f64 = 0.20;
const WEIGHT_CORRELATION: f64 = 0.15;
const WEIGHT_LIQUIDITY: f64 = 0.10;

/// Risk assessor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessorConfig {
    /// Position value that maps to a full exposure score
    pub max_position_size: Decimal,
    /// Position value at which the liquidity size factor is 1.0
    pub reference_notional: Decimal,
    /// Symbols that tend to move with the rest of the book
    pub high_correlation_symbols: Vec<String>,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            max_position_size: dec!(2000),
            reference_notional: dec!(1000),
            high_correlation_symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
        }
    }
}

/// Component scores behind a risk assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents {
    /// Unrealized P&L as a fraction of current value (signed)
    pub unrealized_pnl_frac: f64,
    pub exposure: f64,
    pub volatility: f64,
    pub correlation: f64,
    pub liquidity: f64,
}

/// Derived risk view of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub position_id: PositionId,
    pub symbol: String,
    pub score: f64,
    pub level: RiskLevel,
    pub action: RecommendedAction,
    pub components: RiskComponents,
    pub assessed_at: DateTime<Utc>,
}

/// Scores positions from valuation and market inputs. Holds no state.
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor {
    config: AssessorConfig,
}

impl RiskAssessor {
    pub fn new(config: AssessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssessorConfig {
        &self.config
    }

    /// Assess a position against a market snapshot.
    pub fn assess(&self, position: &Position, market: &MarketSnapshot) -> RiskAssessment {
        let components = RiskComponents {
            unrealized_pnl_frac: self.pnl_fraction(position),
            exposure: self.exposure_score(position),
            volatility: volatility_score(market.change_pct, position.leverage),
            correlation: self.correlation_score(&position.symbol),
            liquidity: self.liquidity_score(position, market.spread_pct),
        };
        let score = composite_score(&components);
        let level = RiskLevel::from_score(score);

        RiskAssessment {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            score,
            level,
            action: recommend(level, components.unrealized_pnl_frac),
            components,
            assessed_at: market.timestamp,
        }
    }

    fn pnl_fraction(&self, position: &Position) -> f64 {
        if position.current_value <= Decimal::ZERO {
            return 0.0;
        }
        (position.unrealized_pnl / position.current_value)
            .to_f64()
            .unwrap_or(0.0)
    }

    fn exposure_score(&self, position: &Position) -> f64 {
        if self.config.max_position_size <= Decimal::ZERO {
            return 1.0;
        }
        let ratio = (position.current_value / self.config.max_position_size)
            .to_f64()
            .unwrap_or(1.0);
        ratio.clamp(0.0, 1.0)
    }

    fn correlation_score(&self, symbol: &str) -> f64 {
        let symbol = normalize_symbol(symbol);
        let correlated = self
            .config
            .high_correlation_symbols
            .iter()
            .any(|s| normalize_symbol(s) == symbol);
        if correlated {
            0.5
        } else {
            0.3
        }
    }

    fn liquidity_score(&self, position: &Position, spread_pct: f64) -> f64 {
        let base = if spread_pct < 0.01 {
            0.1
        } else if spread_pct < 0.05 {
            0.3
        } else {
            0.7
        };
        let size_factor = if self.config.reference_notional > Decimal::ZERO {
            (position.current_value / self.config.reference_notional)
                .to_f64()
                .unwrap_or(2.0)
                .min(2.0)
        } else {
            2.0
        };
        (base * size_factor).clamp(0.0, 1.0)
    }
}

/// Recent move magnitude scaled by leverage, capped at 1.
fn volatility_score(change_pct: f64, leverage: u32) -> f64 {
    let leverage_factor = (f64::from(leverage) / 5.0).min(3.0);
    ((change_pct / 100.0).abs() * leverage_factor * 10.0).min(1.0)
}

fn composite_score(c: &RiskComponents) -> f64 {
    let mut score = c.unrealized_pnl_frac.abs() * WEIGHT_PNL
        + c.exposure.abs() * WEIGHT_EXPOSURE
        + c.volatility.abs() * WEIGHT_VOLATILITY
        + c.correlation.abs() * WEIGHT_CORRELATION
        + c.liquidity.abs() * WEIGHT_LIQUIDITY;

    if c.unrealized_pnl_frac < -0.05 {
        score *= 1.5;
    } else if c.unrealized_pnl_frac > 0.10 {
        score *= 0.7;
    }
    score.clamp(0.0, 1.0)
}

fn recommend(level: RiskLevel, pnl_frac: f64) -> RecommendedAction {
    match level {
        RiskLevel::VeryHigh => RecommendedAction::Close,
        RiskLevel::High => RecommendedAction::Reduce,
        RiskLevel::Medium if pnl_frac < -0.03 => RecommendedAction::Hedge,
        _ => RecommendedAction::Hold,
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.replace(['/', '-', '_'], "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskbook_core::{OpenPosition, PositionSide};

    fn position(symbol: &str, quantity: Decimal, entry: Decimal, price: Decimal, leverage: u32) -> Position {
        let params = OpenPosition::long(symbol, quantity, entry).with_leverage(leverage);
        let mut position = Position::new(PositionId::new(1, symbol, PositionSide::Long), &params, Utc::now());
        position.update_price(price, Utc::now());
        position
    }

    fn market(symbol: &str, price: Decimal, change_pct: f64, spread_pct: f64) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::flat(symbol, price);
        snapshot.change_pct = change_pct;
        snapshot.spread_pct = spread_pct;
        snapshot
    }

    #[test]
    fn test_small_quiet_position_is_low_risk() {
        let assessor = RiskAssessor::default();
        let position = position("ADAUSDT", dec!(1000), dec!(0.5), dec!(0.5), 1);
        let assessment = assessor.assess(&position, &market("ADAUSDT", dec!(0.5), 0.0, 0.005));

        // exposure 0.25, correlation 0.3, liquidity 0.05
        let expected = 0.25 * 0.25 + 0.3 * 0.15 + 0.05 * 0.10;
        assert!((assessment.score - expected).abs() < 1e-9);
        assert_eq!(assessment.level, RiskLevel::VeryLow);
        assert_eq!(assessment.action, RecommendedAction::Hold);
    }

    #[test]
    fn test_deep_loss_is_amplified_to_close() {
        let assessor = RiskAssessor::default();
        // Value 1600 after a 20% drop, 10x leverage, wide spread.
        let position = position("BTCUSDT", dec!(0.04), dec!(50000), dec!(40000), 10);
        let assessment = assessor.assess(&position, &market("BTCUSDT", dec!(40000), -20.0, 0.1));

        assert!(assessment.components.unrealized_pnl_frac < -0.05);
        assert_eq!(assessment.components.volatility, 1.0);
        assert_eq!(assessment.components.correlation, 0.5);
        assert_eq!(assessment.level, RiskLevel::VeryHigh);
        assert_eq!(assessment.action, RecommendedAction::Close);
        assert!(assessment.score <= 1.0);
    }

    #[test]
    fn test_medium_loss_recommends_hedge() {
        let components = RiskComponents {
            unrealized_pnl_frac: -0.04,
            exposure: 1.0,
            volatility: 0.4,
            correlation: 0.5,
            liquidity: 0.6,
        };
        let score = composite_score(&components);
        assert_eq!(RiskLevel::from_score(score), RiskLevel::Medium);
        assert_eq!(recommend(RiskLevel::Medium, -0.04), RecommendedAction::Hedge);
        assert_eq!(recommend(RiskLevel::Medium, -0.01), RecommendedAction::Hold);
        assert_eq!(recommend(RiskLevel::High, 0.0), RecommendedAction::Reduce);
    }

    #[test]
    fn test_large_gain_is_dampened() {
        let base = RiskComponents {
            unrealized_pnl_frac: 0.09,
            exposure: 0.5,
            volatility: 0.2,
            correlation: 0.3,
            liquidity: 0.1,
        };
        let gain = RiskComponents {
            unrealized_pnl_frac: 0.2,
            ..base
        };
        assert!(composite_score(&gain) < composite_score(&base) + 0.03);
    }

    #[test]
    fn test_volatility_scales_with_leverage() {
        assert!((volatility_score(2.0, 1) - 0.04).abs() < 1e-12);
        assert!(volatility_score(2.0, 10) > volatility_score(2.0, 1));
        assert_eq!(volatility_score(50.0, 20), 1.0);
    }

    #[test]
    fn test_symbol_normalization_for_correlation() {
        let assessor = RiskAssessor::default();
        assert_eq!(assessor.correlation_score("BTC/USDT"), 0.5);
        assert_eq!(assessor.correlation_score("eth-usdt"), 0.5);
        assert_eq!(assessor.correlation_score("DOGEUSDT"), 0.3);
    }
}

//! Pre-trade order validation.

use num_traits::FromPrimitive;
use riskbook_core::{OrderProposal, Position, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::position_sizer::PositionSizer;

/// Limits enforced before any new order is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum value of a single position
    pub max_position_size: Decimal,
    /// Maximum position value as a fraction of account balance
    pub max_risk_per_trade: Decimal,
    /// Maximum total exposure as a fraction of account balance
    pub max_portfolio_risk: Decimal,
    /// Maximum number of open positions
    pub max_open_positions: usize,
    /// Minimum reward/risk ratio when both stop and target are given
    pub min_reward_risk: Decimal,
    /// Realized loss for the UTC day beyond which new orders are refused
    pub max_daily_loss: Decimal,
    /// Quantity step for suggested sizes
    pub size_increment: Decimal,
    /// Base stop distance (fraction of entry) for the dynamic stop
    pub default_stop_loss_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: dec!(2000),
            max_risk_per_trade: dec!(0.01),
            max_portfolio_risk: dec!(0.02),
            max_open_positions: 10,
            min_reward_risk: dec!(2.0),
            max_daily_loss: dec!(500),
            size_increment: dec!(0.01),
            default_stop_loss_pct: dec!(0.02),
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("max_position_size", self.max_position_size),
            ("max_risk_per_trade", self.max_risk_per_trade),
            ("max_portfolio_risk", self.max_portfolio_risk),
            ("min_reward_risk", self.min_reward_risk),
            ("max_daily_loss", self.max_daily_loss),
            ("size_increment", self.size_increment),
            ("default_stop_loss_pct", self.default_stop_loss_pct),
        ];
        for (name, value) in positive {
            if value <= Decimal::ZERO {
                return Err(format!("limits.{} must be positive, got {}", name, value));
            }
        }
        if self.max_open_positions == 0 {
            return Err("limits.max_open_positions must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Which check decided a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    Input,
    PositionSize,
    RiskPerTrade,
    PortfolioExposure,
    OpenPositions,
    RewardRisk,
    DailyLoss,
}

/// Outcome of validating a proposal. Rejection is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub failed_check: Option<ValidationCheck>,
    pub suggested_position_size: Option<Decimal>,
}

impl ValidationResult {
    fn allowed(suggested: Decimal) -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
            failed_check: None,
            suggested_position_size: Some(suggested),
        }
    }

    fn rejected(check: ValidationCheck, reason: String) -> Self {
        Self {
            allowed: false,
            reasons: vec![reason],
            failed_check: Some(check),
            suggested_position_size: None,
        }
    }
}

/// Registry state the validator reads.
#[derive(Debug, Clone, Copy)]
pub struct BookState<'a> {
    pub open_positions: &'a [Position],
    /// Net realized P&L booked today
    pub daily_realized: Decimal,
}

/// Pre-trade gate. A pure function of its inputs.
#[derive(Debug, Clone, Default)]
pub struct OrderValidator {
    limits: RiskLimits,
}

impl OrderValidator {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Validate a proposal.
    ///
    /// Checks run in a fixed order (size, portfolio exposure, reward/risk,
    /// daily loss) and stop at the first failure.
    pub fn validate(
        &self,
        proposal: &OrderProposal,
        account_balance: Decimal,
        market_price: Option<Decimal>,
        book: &BookState<'_>,
    ) -> ValidationResult {
        let price = match self.check_input(proposal, account_balance, market_price) {
            Ok(price) => price,
            Err(rejection) => return rejection,
        };
        let value = proposal.quantity * price;

        if let Some(rejection) = self.check_size(value, account_balance) {
            return rejection;
        }
        if let Some(rejection) = self.check_portfolio(value, account_balance, book) {
            return rejection;
        }
        if let Some(rejection) = self.check_reward_risk(proposal, price) {
            return rejection;
        }
        if let Some(rejection) = self.check_daily_loss(book) {
            return rejection;
        }

        ValidationResult::allowed(self.suggest_size(proposal, price, account_balance))
    }

    /// Stop-loss distance widened by volatility: `entry × (1 ∓ base × (1 + 5 × volatility))`.
    pub fn dynamic_stop_loss(&self, entry_price: Decimal, side: Side, volatility: f64) -> Decimal {
        let adjustment = Decimal::from_f64(1.0 + volatility.max(0.0) * 5.0).unwrap_or(Decimal::ONE);
        let stop_pct = self.limits.default_stop_loss_pct * adjustment;
        match side {
            Side::Buy => entry_price * (Decimal::ONE - stop_pct),
            Side::Sell => entry_price * (Decimal::ONE + stop_pct),
        }
    }

    fn check_input(
        &self,
        proposal: &OrderProposal,
        account_balance: Decimal,
        market_price: Option<Decimal>,
    ) -> Result<Decimal, ValidationResult> {
        let reject = |reason: String| ValidationResult::rejected(ValidationCheck::Input, reason);

        if proposal.symbol.trim().is_empty() {
            return Err(reject("Symbol is empty".to_string()));
        }
        if proposal.quantity <= Decimal::ZERO {
            return Err(reject(format!("Quantity must be positive, got {}", proposal.quantity)));
        }
        if account_balance <= Decimal::ZERO {
            return Err(reject(format!(
                "Account balance must be positive, got {}",
                account_balance
            )));
        }
        match proposal.effective_price(market_price) {
            Some(price) if price > Decimal::ZERO => Ok(price),
            Some(price) => Err(reject(format!("Price must be positive, got {}", price))),
            None => Err(reject(format!("No price available for {}", proposal.symbol))),
        }
    }

    fn check_size(&self, value: Decimal, balance: Decimal) -> Option<ValidationResult> {
        if value > self.limits.max_position_size {
            return Some(ValidationResult::rejected(
                ValidationCheck::PositionSize,
                format!(
                    "Position value {:.2} exceeds max position size {:.2}",
                    value, self.limits.max_position_size
                ),
            ));
        }
        let risk = value / balance;
        if risk > self.limits.max_risk_per_trade {
            return Some(ValidationResult::rejected(
                ValidationCheck::RiskPerTrade,
                format!(
                    "Trade risk {:.2}% exceeds max risk per trade {:.2}%",
                    risk * dec!(100),
                    self.limits.max_risk_per_trade * dec!(100)
                ),
            ));
        }
        None
    }

    fn check_portfolio(
        &self,
        value: Decimal,
        balance: Decimal,
        book: &BookState<'_>,
    ) -> Option<ValidationResult> {
        let exposure: Decimal = book.open_positions.iter().map(|p| p.current_value).sum();
        let ratio = (exposure + value) / balance;
        if ratio > self.limits.max_portfolio_risk {
            return Some(ValidationResult::rejected(
                ValidationCheck::PortfolioExposure,
                format!(
                    "Portfolio exposure {:.2}% exceeds max portfolio risk {:.2}%",
                    ratio * dec!(100),
                    self.limits.max_portfolio_risk * dec!(100)
                ),
            ));
        }
        let open = book.open_positions.len();
        if open >= self.limits.max_open_positions {
            return Some(ValidationResult::rejected(
                ValidationCheck::OpenPositions,
                format!(
                    "Open positions {} at max open positions {}",
                    open, self.limits.max_open_positions
                ),
            ));
        }
        None
    }

    fn check_reward_risk(&self, proposal: &OrderProposal, price: Decimal) -> Option<ValidationResult> {
        let (stop, target) = (proposal.stop_loss?, proposal.take_profit?);
        let risk = (price - stop).abs();
        if risk <= Decimal::ZERO {
            return None;
        }
        let ratio = (target - price).abs() / risk;
        if ratio < self.limits.min_reward_risk {
            return Some(ValidationResult::rejected(
                ValidationCheck::RewardRisk,
                format!(
                    "Reward/risk {:.2} below minimum {:.2}",
                    ratio, self.limits.min_reward_risk
                ),
            ));
        }
        None
    }

    fn check_daily_loss(&self, book: &BookState<'_>) -> Option<ValidationResult> {
        if book.daily_realized < -self.limits.max_daily_loss {
            return Some(ValidationResult::rejected(
                ValidationCheck::DailyLoss,
                format!(
                    "Daily realized loss {:.2} exceeds max daily loss {:.2}",
                    -book.daily_realized, self.limits.max_daily_loss
                ),
            ));
        }
        None
    }

    fn suggest_size(&self, proposal: &OrderProposal, price: Decimal, balance: Decimal) -> Decimal {
        let stop = proposal
            .stop_loss
            .unwrap_or_else(|| self.dynamic_stop_loss(price, proposal.side, 0.0));
        PositionSizer::new(self.limits.max_risk_per_trade)
            .with_max_notional(self.limits.max_position_size)
            .with_increment(self.limits.size_increment)
            .calculate(balance, price, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riskbook_core::{OpenPosition, PositionId};

    const BALANCE: Decimal = dec!(1000000);

    fn empty_book() -> BookState<'static> {
        BookState {
            open_positions: &[],
            daily_realized: Decimal::ZERO,
        }
    }

    fn open_position(symbol: &str, quantity: Decimal, price: Decimal) -> Position {
        let params = OpenPosition::long(symbol, quantity, price);
        Position::new(PositionId::new(1, symbol, params.side), &params, Utc::now())
    }

    #[test]
    fn test_size_limit_rejects() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::limit("BTCUSDT", Side::Buy, dec!(0.042), dec!(50000));

        let result = validator.validate(&proposal, BALANCE, None, &empty_book());
        assert!(!result.allowed);
        assert_eq!(result.failed_check, Some(ValidationCheck::PositionSize));
        assert!(result.reasons[0].contains("max position size"));
        assert_eq!(result.suggested_position_size, None);
    }

    #[test]
    fn test_allowed_with_suggested_size() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::market("BTCUSDT", Side::Buy, dec!(0.02))
            .with_stop_loss(dec!(49000))
            .with_take_profit(dec!(52500));

        let result = validator.validate(&proposal, BALANCE, Some(dec!(50000)), &empty_book());
        assert!(result.allowed, "{:?}", result.reasons);
        // 1% of 1,000,000 / 1000 = 10 units, capped to 2000 / 50000 = 0.04
        assert_eq!(result.suggested_position_size, Some(dec!(0.04)));
    }

    #[test]
    fn test_risk_per_trade_rejects_small_balance() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::market("ETHUSDT", Side::Buy, dec!(0.5));
        let result = validator.validate(&proposal, dec!(10000), Some(dec!(3000)), &empty_book());
        assert_eq!(result.failed_check, Some(ValidationCheck::RiskPerTrade));
    }

    #[test]
    fn test_portfolio_exposure_and_count() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::market("ETHUSDT", Side::Buy, dec!(0.5));

        let heavy = vec![open_position("BTCUSDT", dec!(0.4), dec!(50000))];
        let book = BookState {
            open_positions: &heavy,
            daily_realized: Decimal::ZERO,
        };
        let result = validator.validate(&proposal, BALANCE, Some(dec!(3000)), &book);
        assert_eq!(result.failed_check, Some(ValidationCheck::PortfolioExposure));

        let many: Vec<Position> = (0..10)
            .map(|_| open_position("ADAUSDT", dec!(10), dec!(0.5)))
            .collect();
        let book = BookState {
            open_positions: &many,
            daily_realized: Decimal::ZERO,
        };
        let result = validator.validate(&proposal, BALANCE, Some(dec!(3000)), &book);
        assert_eq!(result.failed_check, Some(ValidationCheck::OpenPositions));
    }

    #[test]
    fn test_reward_risk_rejects() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::market("BTCUSDT", Side::Buy, dec!(0.02))
            .with_stop_loss(dec!(49000))
            .with_take_profit(dec!(51500));
        let result = validator.validate(&proposal, BALANCE, Some(dec!(50000)), &empty_book());
        assert_eq!(result.failed_check, Some(ValidationCheck::RewardRisk));
    }

    #[test]
    fn test_daily_loss_rejects_only_beyond_limit() {
        let validator = OrderValidator::default();
        let proposal = OrderProposal::market("BTCUSDT", Side::Buy, dec!(0.02));

        let at_limit = BookState {
            open_positions: &[],
            daily_realized: dec!(-500),
        };
        assert!(validator.validate(&proposal, BALANCE, Some(dec!(50000)), &at_limit).allowed);

        let beyond = BookState {
            open_positions: &[],
            daily_realized: dec!(-500.01),
        };
        let result = validator.validate(&proposal, BALANCE, Some(dec!(50000)), &beyond);
        assert_eq!(result.failed_check, Some(ValidationCheck::DailyLoss));
    }

    #[test]
    fn test_malformed_proposals_are_rejected_values() {
        let validator = OrderValidator::default();
        let zero = OrderProposal::market("BTCUSDT", Side::Buy, Decimal::ZERO);
        assert_eq!(
            validator.validate(&zero, BALANCE, Some(dec!(50000)), &empty_book()).failed_check,
            Some(ValidationCheck::Input)
        );

        let unpriced = OrderProposal::market("BTCUSDT", Side::Buy, dec!(0.01));
        let result = validator.validate(&unpriced, BALANCE, None, &empty_book());
        assert!(!result.allowed);
        assert!(result.reasons[0].contains("No price"));

        assert!(!validator.validate(&unpriced, Decimal::ZERO, Some(dec!(50000)), &empty_book()).allowed);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let validator = OrderValidator::default();
        let positions = vec![open_position("BTCUSDT", dec!(0.01), dec!(50000))];
        let book = BookState {
            open_positions: &positions,
            daily_realized: dec!(-100),
        };
        let proposal = OrderProposal::market("ETHUSDT", Side::Sell, dec!(0.3)).with_stop_loss(dec!(3100));
        let first = validator.validate(&proposal, BALANCE, Some(dec!(3000)), &book);
        for _ in 0..5 {
            assert_eq!(validator.validate(&proposal, BALANCE, Some(dec!(3000)), &book), first);
        }
    }

    #[test]
    fn test_dynamic_stop_loss() {
        let validator = OrderValidator::default();
        assert_eq!(validator.dynamic_stop_loss(dec!(100), Side::Buy, 0.0), dec!(98));
        assert_eq!(validator.dynamic_stop_loss(dec!(100), Side::Sell, 0.0), dec!(102));
        // 2% × (1 + 5 × 0.1) = 3%
        assert_eq!(validator.dynamic_stop_loss(dec!(100), Side::Buy, 0.1), dec!(97));
    }
}

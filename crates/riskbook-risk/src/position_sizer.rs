//! Risk-based position sizing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Sizes a position so that hitting the stop loses a fixed share of the balance.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    /// Fraction of the balance lost if the stop is hit
    risk_fraction: Decimal,
    max_notional: Option<Decimal>,
    increment: Decimal,
}

impl PositionSizer {
    pub fn new(risk_fraction: Decimal) -> Self {
        Self {
            risk_fraction,
            max_notional: None,
            increment: dec!(0.01),
        }
    }

    /// Cap the position value.
    pub fn with_max_notional(mut self, max: Decimal) -> Self {
        self.max_notional = Some(max);
        self
    }

    /// Quantity step the result is floored to.
    pub fn with_increment(mut self, increment: Decimal) -> Self {
        self.increment = increment;
        self
    }

    /// Quantity for an entry at `entry_price` protected by `stop_price`.
    ///
    /// Zero when the inputs leave no room to size (no balance, stop at entry).
    pub fn calculate(&self, balance: Decimal, entry_price: Decimal, stop_price: Decimal) -> Decimal {
        if entry_price <= Decimal::ZERO || balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let per_unit = (entry_price - stop_price).abs();
        if per_unit.is_zero() {
            return Decimal::ZERO;
        }

        let mut quantity = (balance * self.risk_fraction / per_unit).max(Decimal::ZERO);
        if let Some(max) = self.max_notional {
            quantity = quantity.min(max / entry_price);
        }
        floor_to_increment(quantity, self.increment)
    }
}

/// Round `value` down to a multiple of `increment`.
pub fn floor_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    (value / increment).floor() * increment
}

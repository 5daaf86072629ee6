//! Mutation handle handed to [`PositionRegistry::mutate`](crate::PositionRegistry::mutate).

use chrono::{DateTime, Utc};
use riskbook_core::{CloseReason, Position, RegistryError, RiskLevel};
use rust_decimal::Decimal;
use std::ops::Deref;

/// Realized P&L produced by one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    /// Quantity closed by this slice (zero for a fill adjustment)
    pub quantity: Decimal,
    /// Realized P&L of this slice
    pub pnl: Decimal,
    /// Position's total realized P&L, set when this slice closed it fully
    pub closed_total: Option<Decimal>,
    pub at: DateTime<Utc>,
}

impl Realization {
    pub fn is_full_close(&self) -> bool {
        self.closed_total.is_some()
    }
}

/// Result of a partial close request.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialCloseOutcome {
    /// A slice was closed and the position stays open
    Applied { quantity: Decimal, realized: Decimal },
    /// The rung key had already fired; nothing changed
    AlreadyApplied,
    /// The remainder would have been zero or negative, so the position closed
    ClosedFully { quantity: Decimal, realized: Decimal },
}

impl PartialCloseOutcome {
    /// Realized P&L credited by this request.
    pub fn realized(&self) -> Decimal {
        match self {
            PartialCloseOutcome::Applied { realized, .. }
            | PartialCloseOutcome::ClosedFully { realized, .. } => *realized,
            PartialCloseOutcome::AlreadyApplied => Decimal::ZERO,
        }
    }

    /// Quantity closed by this request.
    pub fn quantity(&self) -> Decimal {
        match self {
            PartialCloseOutcome::Applied { quantity, .. }
            | PartialCloseOutcome::ClosedFully { quantity, .. } => *quantity,
            PartialCloseOutcome::AlreadyApplied => Decimal::ZERO,
        }
    }
}

/// Exclusive access to one open position for the duration of a mutation.
///
/// Reads go through `Deref<Target = Position>`. Writes go through methods that
/// keep `current_value == quantity * current_price` and record every
/// realization so the registry can update its daily counters afterwards.
pub struct PositionMut<'a> {
    position: &'a mut Position,
    realizations: Vec<Realization>,
}

impl<'a> PositionMut<'a> {
    pub(crate) fn new(position: &'a mut Position) -> Self {
        Self {
            position,
            realizations: Vec::new(),
        }
    }

    pub(crate) fn into_realizations(self) -> Vec<Realization> {
        self.realizations
    }

    /// Realizations recorded so far in this mutation.
    pub fn realizations(&self) -> &[Realization] {
        &self.realizations
    }

    pub fn is_closed(&self) -> bool {
        !self.position.is_open()
    }

    /// Reprice the position.
    pub fn update_price(&mut self, price: Decimal, at: DateTime<Utc>) -> Result<(), RegistryError> {
        if price <= Decimal::ZERO {
            return Err(RegistryError::InvalidPrice(price.to_string()));
        }
        self.position.update_price(price, at);
        Ok(())
    }

    pub fn set_stop_loss(&mut self, stop_loss: Decimal) {
        self.position.stop_loss = Some(stop_loss);
    }

    pub fn set_take_profit(&mut self, take_profit: Decimal) {
        self.position.take_profit = Some(take_profit);
    }

    pub fn set_risk_level(&mut self, level: RiskLevel) {
        self.position.risk_level = level;
    }

    pub fn mark_stale(&mut self) {
        self.position.stale = true;
    }

    /// Record a trigger marker. Returns false if it had already fired.
    pub fn mark_fired(&mut self, key: impl Into<String>) -> bool {
        self.position.mark_fired(key)
    }

    /// Close `fraction` of the remaining quantity at the current price.
    ///
    /// A fired `rung_key` is a no-op. A fraction that leaves nothing open
    /// closes the whole position with reason `full_close`.
    pub fn partial_close(
        &mut self,
        fraction: Decimal,
        rung_key: &str,
        at: DateTime<Utc>,
    ) -> Result<PartialCloseOutcome, RegistryError> {
        self.ensure_unclaimed()?;
        if fraction <= Decimal::ZERO {
            return Err(RegistryError::InvalidQuantity(format!(
                "partial close fraction must be positive, got {}",
                fraction
            )));
        }
        if !self.position.mark_fired(rung_key) {
            return Ok(PartialCloseOutcome::AlreadyApplied);
        }

        let close_quantity = self.position.quantity * fraction;
        if self.position.quantity - close_quantity <= Decimal::ZERO {
            let (quantity, realized) = self.close_slice(CloseReason::FullClose, at);
            return Ok(PartialCloseOutcome::ClosedFully { quantity, realized });
        }

        let realized = self.position.reduce(close_quantity, at);
        self.realizations.push(Realization {
            quantity: close_quantity,
            pnl: realized,
            closed_total: None,
            at,
        });
        Ok(PartialCloseOutcome::Applied {
            quantity: close_quantity,
            realized,
        })
    }

    /// Close the remaining quantity at the current price.
    ///
    /// Returns the realized P&L of the closing slice.
    pub fn close(&mut self, reason: CloseReason, at: DateTime<Utc>) -> Result<Decimal, RegistryError> {
        self.ensure_unclaimed()?;
        Ok(self.close_slice(reason, at).1)
    }

    /// Reserve the full close for a caller about to go to the gateway.
    ///
    /// Until [`release_close`](Self::release_close), `close` and
    /// `partial_close` fail with `ClosePending`; repricing still applies.
    pub fn claim_close(&mut self) -> Result<(), RegistryError> {
        self.ensure_unclaimed()?;
        self.position.close_pending = true;
        Ok(())
    }

    /// Drop a claim taken by [`claim_close`](Self::claim_close).
    pub fn release_close(&mut self) {
        self.position.close_pending = false;
    }

    /// Apply a realized P&L correction from a fill reconciliation.
    pub fn adjust_realized(&mut self, delta: Decimal, at: DateTime<Utc>) {
        self.position.adjust_realized(delta, at);
        self.realizations.push(Realization {
            quantity: Decimal::ZERO,
            pnl: delta,
            closed_total: None,
            at,
        });
    }

    fn close_slice(&mut self, reason: CloseReason, at: DateTime<Utc>) -> (Decimal, Decimal) {
        let (quantity, realized) = self.position.close_out(reason, at);
        self.realizations.push(Realization {
            quantity,
            pnl: realized,
            closed_total: Some(self.position.realized_pnl),
            at,
        });
        (quantity, realized)
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.position.is_open() {
            Ok(())
        } else {
            Err(RegistryError::NotFound(self.position.id.clone()))
        }
    }

    fn ensure_unclaimed(&self) -> Result<(), RegistryError> {
        self.ensure_open()?;
        if self.position.close_pending {
            return Err(RegistryError::ClosePending(self.position.id.clone()));
        }
        Ok(())
    }
}

impl Deref for PositionMut<'_> {
    type Target = Position;

    fn deref(&self) -> &Position {
        self.position
    }
}

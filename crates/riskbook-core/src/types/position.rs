//! Position identity, lifecycle and valuation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{CloseReason, RiskLevel, Side, Timeframe};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => -Decimal::ONE,
        }
    }

    /// Order side that reduces or closes a position on this side.
    pub fn closing_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }

    /// Whether `candidate` is a strictly more favorable stop than `current`.
    ///
    /// For a long position a higher stop locks in more; for a short, a lower one.
    pub fn is_tighter_stop(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            PositionSide::Long => candidate > current,
            PositionSide::Short => candidate < current,
        }
    }
}

impl From<Side> for PositionSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Stable position key: open sequence, symbol and side.
///
/// The sequence is a registry-wide monotonic counter assigned at open time,
/// so ids order by opening and never collide within one registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId {
    pub sequence: u64,
    pub symbol: String,
    pub side: PositionSide,
}

impl PositionId {
    pub fn new(sequence: u64, symbol: impl Into<String>, side: PositionSide) -> Self {
        Self {
            sequence,
            symbol: symbol.into(),
            side,
        }
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.symbol, self.side, self.sequence)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
}

/// Parameters for opening a position after the entry order has filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: u32,
    pub timeframe: Timeframe,
}

impl OpenPosition {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            stop_loss: None,
            take_profit: None,
            leverage: 1,
            timeframe: Timeframe::Hour1,
        }
    }

    pub fn long(symbol: impl Into<String>, quantity: Decimal, entry_price: Decimal) -> Self {
        Self::new(symbol, PositionSide::Long, quantity, entry_price)
    }

    pub fn short(symbol: impl Into<String>, quantity: Decimal, entry_price: Decimal) -> Self {
        Self::new(symbol, PositionSide::Short, quantity, entry_price)
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }
}

/// A position in a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Registry key
    pub id: PositionId,
    /// Symbol
    pub symbol: String,
    /// Long or short
    pub side: PositionSide,
    /// Timeframe selecting the trigger configuration
    pub timeframe: Timeframe,
    /// Remaining open quantity (always positive while open)
    pub quantity: Decimal,
    /// Quantity at open
    pub initial_quantity: Decimal,
    /// Entry price
    pub entry_price: Decimal,
    /// Last applied market price
    pub current_price: Decimal,
    /// quantity * current_price
    pub current_value: Decimal,
    /// Unrealized profit/loss on the remaining quantity
    pub unrealized_pnl: Decimal,
    /// Realized profit/loss accumulated across partial and full closes
    pub realized_pnl: Decimal,
    /// Leverage multiplier
    pub leverage: u32,
    /// Last assessed risk level
    pub risk_level: RiskLevel,
    /// Stop-loss price
    pub stop_loss: Option<Decimal>,
    /// Take-profit price
    pub take_profit: Option<Decimal>,
    /// Lifecycle state
    pub status: PositionStatus,
    /// Why the position was closed
    pub close_reason: Option<CloseReason>,
    /// Set when the price feed for this symbol went quiet
    pub stale: bool,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// A full close was sent to the gateway and is not booked yet
    #[serde(default)]
    pub close_pending: bool,
    /// Trigger markers that already fired (ladder rungs, breakeven)
    fired: BTreeSet<String>,
}

impl Position {
    /// Create a new open position from validated parameters.
    pub fn new(id: PositionId, params: &OpenPosition, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: params.symbol.clone(),
            side: params.side,
            timeframe: params.timeframe,
            quantity: params.quantity,
            initial_quantity: params.quantity,
            entry_price: params.entry_price,
            current_price: params.entry_price,
            current_value: params.quantity * params.entry_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            leverage: params.leverage,
            risk_level: RiskLevel::Medium,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            status: PositionStatus::Open,
            close_reason: None,
            stale: false,
            opened_at,
            updated_at: opened_at,
            closed_at: None,
            close_pending: false,
            fired: BTreeSet::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    /// Profit per unit at `price`, signed by side.
    pub fn pnl_per_unit(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.side.sign()
    }

    /// Unrealized P&L as a percentage of entry price, signed by side.
    pub fn pnl_percent(&self) -> Decimal {
        if self.entry_price == Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.pnl_per_unit(self.current_price) / self.entry_price * Decimal::from(100)
    }

    /// Whether a trigger marker has already fired.
    pub fn has_fired(&self, key: &str) -> bool {
        self.fired.contains(key)
    }

    /// Record a trigger marker. Returns false if it was already present.
    pub fn mark_fired(&mut self, key: impl Into<String>) -> bool {
        self.fired.insert(key.into())
    }

    /// Markers fired so far.
    pub fn fired_markers(&self) -> impl Iterator<Item = &str> {
        self.fired.iter().map(String::as_str)
    }

    /// Apply a new market price and recalculate values.
    pub fn update_price(&mut self, price: Decimal, at: DateTime<Utc>) {
        self.current_price = price;
        self.stale = false;
        self.revalue();
        self.updated_at = at;
    }

    /// Reduce the position by `close_quantity` at the current price.
    ///
    /// Returns the realized P&L of the closed slice. The caller guarantees
    /// `0 < close_quantity < quantity`.
    pub fn reduce(&mut self, close_quantity: Decimal, at: DateTime<Utc>) -> Decimal {
        let realized = self.pnl_per_unit(self.current_price) * close_quantity;
        self.quantity -= close_quantity;
        self.realized_pnl += realized;
        self.status = PositionStatus::PartiallyClosed;
        self.revalue();
        self.updated_at = at;
        realized
    }

    /// Close the remaining quantity at the current price.
    ///
    /// Returns `(closed_quantity, realized)` for the final slice.
    pub fn close_out(&mut self, reason: CloseReason, at: DateTime<Utc>) -> (Decimal, Decimal) {
        let closed_quantity = self.quantity;
        let realized = self.pnl_per_unit(self.current_price) * closed_quantity;
        self.realized_pnl += realized;
        self.quantity = Decimal::ZERO;
        self.status = PositionStatus::Closed;
        self.close_reason = Some(reason);
        self.closed_at = Some(at);
        self.revalue();
        self.updated_at = at;
        (closed_quantity, realized)
    }

    /// Add a realized P&L correction (fill reconciliation).
    pub fn adjust_realized(&mut self, delta: Decimal, at: DateTime<Utc>) {
        self.realized_pnl += delta;
        self.updated_at = at;
    }

    fn revalue(&mut self) {
        self.current_value = self.quantity * self.current_price;
        self.unrealized_pnl = self.pnl_per_unit(self.current_price) * self.quantity;
    }
}

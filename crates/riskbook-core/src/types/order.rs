//! Order sides and pre-trade order proposals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the sign for position calculations (+1 for buy, -1 for sell).
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order - priced from the last known market price
    Market,
    /// Limit order - priced at the limit
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// A proposed order awaiting pre-trade validation.
///
/// Proposals are never persisted; they are checked against the live registry
/// and an account balance snapshot, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProposal {
    /// Symbol to trade
    pub symbol: String,
    /// Buy opens a long, sell opens a short
    pub side: Side,
    /// Type of order
    pub order_type: OrderType,
    /// Quantity to trade
    pub quantity: Decimal,
    /// Limit price (limit orders only)
    pub limit_price: Option<Decimal>,
    /// Protective stop-loss price
    pub stop_loss: Option<Decimal>,
    /// Take-profit price
    pub take_profit: Option<Decimal>,
}

impl OrderProposal {
    /// Create a market order proposal.
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Create a limit order proposal.
    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(limit_price),
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Attach a stop-loss price.
    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Attach a take-profit price.
    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Price used to value the proposal: the limit price if present,
    /// otherwise the supplied market reference price.
    pub fn effective_price(&self, market_price: Option<Decimal>) -> Option<Decimal> {
        self.limit_price.or(market_price)
    }
}

//! Core types and traits for the position and risk engine.
//!
//! This crate provides the foundational building blocks including:
//! - Position identity, lifecycle state and valuation
//! - Order proposals, price ticks and market snapshots
//! - Risk levels and recommended actions
//! - Capability traits for market data and order execution collaborators

pub mod types;
pub mod traits;
pub mod error;

pub use error::{DataError, EngineError, EngineResult, GatewayError, RegistryError};
pub use types::*;
pub use traits::*;

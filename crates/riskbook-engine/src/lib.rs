//! Position and risk engine.
//!
//! [`Engine`] ties the registry, trigger evaluation, risk assessment, order
//! validation and execution together behind one `&self` API.
//! [`EngineRuntime`] drives it from market data feeds and a periodic scan.

mod engine;
mod events;
mod runtime;

pub use engine::{Engine, ScanReport};
pub use events::EngineEvent;
pub use runtime::{EngineRuntime, OverflowPolicy, TickRouter};

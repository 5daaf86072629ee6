//! Capability traits for the engine's external collaborators.

mod gateway;
mod market_data;

pub use gateway::ExecutionGateway;
pub use market_data::MarketDataSource;

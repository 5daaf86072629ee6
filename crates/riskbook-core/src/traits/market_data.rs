//! Market data source trait definition.

use crate::error::DataError;
use crate::types::PriceTick;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for real-time price feeds.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Subscribe to price ticks.
    ///
    /// # Arguments
    /// * `symbols` - Symbols to subscribe to; empty means every symbol the source carries
    ///
    /// # Returns
    /// A channel receiver that will receive ticks in feed order
    async fn subscribe(&self, symbols: &[String]) -> Result<mpsc::Receiver<PriceTick>, DataError>;

    /// Get the latest tick for a symbol.
    async fn latest_tick(&self, symbol: &str) -> Result<Option<PriceTick>, DataError>;

    /// Get the source name.
    fn name(&self) -> &str;
}

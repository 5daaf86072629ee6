//! Execution gateway trait definition.

use crate::error::GatewayError;
use crate::types::{CloseIntent, ExecutionReport};
use async_trait::async_trait;

/// Trait for execution gateway integrations.
///
/// The engine decides *what* to close; the gateway places the order with the
/// exchange and reports the fill.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Execute a close or partial-close intent.
    ///
    /// # Arguments
    /// * `intent` - The close intent to fulfil
    ///
    /// # Returns
    /// The execution report with the actual fill price
    async fn execute(&self, intent: &CloseIntent) -> Result<ExecutionReport, GatewayError>;

    /// Check whether the gateway is currently accepting orders.
    async fn is_available(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }

    /// Get the gateway name.
    fn name(&self) -> &str;
}

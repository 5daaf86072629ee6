//! Error types for the position and risk engine.

use thiserror::Error;

use crate::types::PositionId;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Position registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Position not found: {0}")]
    NotFound(PositionId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid leverage: {0} (must be at least 1)")]
    InvalidLeverage(u32),

    #[error("Close already in flight: {0}")]
    ClosePending(PositionId),
}

impl RegistryError {
    /// Not-found is an expected outcome for scans racing with closes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    /// Another path owns the close of this position.
    pub fn is_close_pending(&self) -> bool {
        matches!(self, RegistryError::ClosePending(_))
    }
}

/// Execution gateway errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Gateway call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl GatewayError {
    /// Whether the call may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Unavailable(_) | GatewayError::Connection(_)
        )
    }
}

/// Market data errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("No data available")]
    NoDataAvailable,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Feed closed")]
    Closed,
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::Timeout { timeout_ms: 500 }.is_retryable());
        assert!(GatewayError::Unavailable("maintenance".into()).is_retryable());
        assert!(!GatewayError::Rejected("insufficient margin".into()).is_retryable());
        assert!(!GatewayError::RetriesExhausted {
            attempts: 3,
            last_error: "timeout".into()
        }
        .is_retryable());
    }
}

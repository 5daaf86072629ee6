//! Timeout and retry policy for gateway calls.

use riskbook_core::{CloseIntent, ExecutionGateway, ExecutionReport, GatewayError};
use std::time::Duration;
use tracing::{error, warn};

/// Bounds each gateway call with a timeout and retries transient failures
/// with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Execute `intent`, retrying timeouts and transient errors.
    ///
    /// Non-retryable errors return immediately. When every attempt fails the
    /// result is [`GatewayError::RetriesExhausted`].
    pub async fn execute(
        &self,
        gateway: &dyn ExecutionGateway,
        intent: &CloseIntent,
    ) -> Result<ExecutionReport, GatewayError> {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(self.timeout, gateway.execute(intent)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(report) => return Ok(report),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt < attempts {
                        let backoff = self.backoff_for(attempt);
                        warn!(
                            gateway = gateway.name(),
                            position = %intent.position_id,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "Retryable gateway error, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            gateway = gateway.name(),
            position = %intent.position_id,
            attempts,
            last_error = %last_error,
            "Gateway retries exhausted"
        );
        Err(GatewayError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

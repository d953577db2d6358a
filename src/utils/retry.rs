//! Retry utilities with exponential backoff for transient transport failures.
//!
//! Retries live inside the transport only. Once a failure escapes
//! [`with_retry`] it is final for that request.

use std::time::Duration;
use tokio::time::sleep;

use crate::transport::TransportFailure;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Allow `retries` retries after the first attempt
    pub fn with_retries(retries: u32) -> Self {
        Self::default().max_attempts(retries.saturating_add(1))
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based attempt that just failed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powf(attempt.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient failures that should trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    /// Network connectivity issues
    Network,
    /// Request timeout
    Timeout,
    /// Too many requests (429)
    TooManyRequests,
    /// Bad gateway (502)
    BadGateway,
    /// Service unavailable (503)
    ServiceUnavailable,
    /// Gateway timeout (504)
    GatewayTimeout,
}

impl TransientError {
    /// Classify a transport failure; `None` means it is permanent
    pub fn from_failure(failure: &TransportFailure) -> Option<Self> {
        match failure {
            TransportFailure::Network(_) => Some(TransientError::Network),
            TransportFailure::Timeout(_) => Some(TransientError::Timeout),
            TransportFailure::Status { status, .. } => Self::from_status(*status),
            TransportFailure::InvalidRequest(_) => None,
        }
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(TransientError::TooManyRequests),
            502 => Some(TransientError::BadGateway),
            503 => Some(TransientError::ServiceUnavailable),
            504 => Some(TransientError::GatewayTimeout),
            _ => None,
        }
    }
}

/// Execute an async operation, retrying transient failures with backoff
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, TransportFailure>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TransportFailure>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Request succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_failure(&error) else {
                    return Err(error);
                };

                if attempts >= config.max_attempts {
                    tracing::warn!("Request failed after {} attempts: {}", attempts, error);
                    return Err(error);
                }

                let delay = config.delay_for(attempts);
                tracing::debug!(
                    "Transient error on attempt {}: {:?}, retrying in {:?}",
                    attempts,
                    transient,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

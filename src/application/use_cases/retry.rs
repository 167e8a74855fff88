use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential backoff for external capability calls.
///
/// Each attempt runs under `timeout`; an elapsed attempt counts as an
/// `ExternalCapability` failure. Any other error kind returns immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::ExternalCapability(format!(
                    "{} timed out after {}s",
                    label,
                    self.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "External call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(AppError::ExternalCapability(format!(
                        "{} failed after {} attempts: {}",
                        label,
                        attempt,
                        err.root()
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

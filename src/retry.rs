use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{ExtractionError, VisionError};
use crate::metrics;

/// Linear backoff: the n-th retry waits `base_delay * n`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub enabled: bool,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            enabled: true,
        }
    }

    /// A disabled policy makes exactly one attempt
    pub fn with_retries(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Saturates at `Duration::MAX` instead of overflowing
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Retry executor for vision service calls
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds or the policy is exhausted.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ExtractionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, VisionError>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            debug!("Attempt {} of {}", attempt + 1, max_attempts);

            let err = match operation(attempt + 1).await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };
            attempt += 1;

            if attempt < max_attempts && self.policy.enabled {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Extraction failed, retrying in {}ms",
                    delay.as_millis()
                );
                metrics::EXTRACT_RETRIES.inc();
                sleep(delay).await;
            } else {
                error!(attempt, error = %err, "Extraction failed");
                return Err(ExtractionError::ExtractionFailed {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

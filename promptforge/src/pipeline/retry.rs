//! Retry wrapper with exponential backoff and a per-attempt timeout.
//!
//! Every attempt is bounded by the call timeout; a timeout counts as a
//! retryable failure. A fatal failure stops immediately. The caller gets a
//! typed [`CallOutcome`] and never an error.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::core::{CallFailure, CallOutcome};

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts left.
    GiveUp,
    /// The failure cannot be fixed by retrying.
    NotRetryable,
}

/// Retry policy applied to every external call of a stage.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    call_timeout: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(config: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            config,
            call_timeout,
        }
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Decides what follows failed attempt `attempt` (0-based).
    #[must_use]
    pub fn decide(&self, attempt: usize, failure: &CallFailure) -> RetryDecision {
        if !failure.is_retryable() {
            RetryDecision::NotRetryable
        } else if attempt + 1 >= self.config.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.config.delay_for_attempt(attempt))
        }
    }

    /// Runs `operation` until it succeeds, fails fatally or runs out of
    /// attempts.
    ///
    /// `key` identifies the record in logs.
    pub async fn execute<T, F, Fut>(&self, key: usize, mut operation: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let mut attempt = 0;
        loop {
            let failure = match tokio::time::timeout(self.call_timeout, operation()).await {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        debug!(index = key, attempts = attempt + 1, "Call succeeded after retry");
                    }
                    return CallOutcome::Completed(value);
                }
                Ok(Err(failure)) => failure,
                Err(_) => CallFailure::retryable(format!(
                    "timed out after {:.1}s",
                    self.call_timeout.as_secs_f64()
                )),
            };

            match self.decide(attempt, &failure) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        index = key,
                        attempt = attempt + 1,
                        max_attempts = self.config.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %failure,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    return CallOutcome::Exhausted {
                        attempts: attempt + 1,
                        last_error: failure.reason().to_string(),
                    };
                }
                RetryDecision::NotRetryable => {
                    return CallOutcome::Fatal {
                        reason: failure.reason().to_string(),
                    };
                }
            }
        }
    }
}

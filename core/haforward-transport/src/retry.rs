//! Bounded fixed-interval retry.
//!
//! [`FailsafePolicy`] wraps one unit of work that reports `Ok(true)` on
//! success, `Ok(false)` when it should be tried again, and `Err` when it
//! failed. Retryable errors are treated like `Ok(false)`; any other error
//! aborts immediately. Exhaustion resolves to `false` and is logged, never
//! propagated.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Errors that know whether another attempt can help.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::error::ForwardError {
    fn is_retryable(&self) -> bool {
        crate::error::ForwardError::is_retryable(self)
    }
}

/// Serializable retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_tries: u32,
    /// Fixed delay between attempts (milliseconds).
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: 10,
            retry_interval_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Sets the attempt budget.
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Sets the delay between attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }
}

/// Outcome of a policy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    pub succeeded: bool,
    /// Number of times the work was invoked.
    pub made: u32,
}

/// Fixed-delay bounded retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailsafePolicy {
    max_attempts: u32,
    retry_interval: Duration,
}

impl FailsafePolicy {
    /// Creates a policy. A budget of zero is raised to one attempt.
    pub fn new(max_attempts: u32, retry_interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_interval,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Runs `work` until it succeeds, aborts or the budget is spent.
    ///
    /// `work` receives the 1-based attempt number. `label` names the
    /// operation in log lines. Cancellation drops the pending delay and
    /// resolves to failure.
    pub async fn run<F, Fut, E>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Attempts
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: Retryable,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match work(attempt).await {
                Ok(true) => {
                    return Attempts {
                        succeeded: true,
                        made: attempt,
                    };
                }
                Ok(false) => {
                    debug!("{label}: attempt {attempt}/{} failed", self.max_attempts);
                }
                Err(e) if e.is_retryable() => {
                    warn!("{label}: attempt {attempt}/{} failed: {e}", self.max_attempts);
                }
                Err(e) => {
                    error!("{label}: giving up after non-recoverable error: {e}");
                    return Attempts {
                        succeeded: false,
                        made: attempt,
                    };
                }
            }

            if attempt >= self.max_attempts {
                error!("{label}: failed after {attempt} attempts");
                return Attempts {
                    succeeded: false,
                    made: attempt,
                };
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("{label}: retry cancelled");
                    return Attempts {
                        succeeded: false,
                        made: attempt,
                    };
                }
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}

impl Default for FailsafePolicy {
    fn default() -> Self {
        FailsafePolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for FailsafePolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_tries,
            Duration::from_millis(config.retry_interval_ms),
        )
    }
}

//! Bounded retry policy shared by page collection and forwarding.
//!
//! The delay between attempts is fixed. There is no exponential growth
//! and no memory of which proxy failed.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;

/// Attempt bound plus the pause applied after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (or tolerated failures for a [`FailureBudget`])
    pub max_attempts: u32,

    /// Pause after each failed attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Collection policy: tolerate `max(1, proxies) * multiplier` failures.
    pub fn for_collection(proxy_count: usize, multiplier: usize, backoff: Duration) -> Self {
        let failures = proxy_count.max(1).saturating_mul(multiplier.max(1));
        Self::new(u32::try_from(failures).unwrap_or(u32::MAX), backoff)
    }

    /// Starts a fresh failure counter for one cycle.
    pub fn budget(&self) -> FailureBudget {
        FailureBudget {
            limit: self.max_attempts,
            used: 0,
        }
    }

    /// Sleeps for the configured backoff.
    pub async fn pause(&self) {
        if !self.backoff.is_zero() {
            sleep(self.backoff).await;
        }
    }

    /// Runs `operation` until it succeeds or the attempts are used up.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts => {
                    debug!(
                        "[RETRY] attempt {}/{} failed: {} – retry in {:?}",
                        attempt, self.max_attempts, e, self.backoff
                    );
                    self.pause().await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Failure counter scoped to one collection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureBudget {
    limit: u32,
    used: u32,
}

impl FailureBudget {
    /// Records one failure; returns false once the budget is exceeded.
    pub fn record_failure(&mut self) -> bool {
        self.used = self.used.saturating_add(1);
        !self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.used > self.limit
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

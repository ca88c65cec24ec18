//! Retry Decorator
//!
//! Optional exponential-backoff wrapper around a [`FetchFn`]. The cache core
//! never retries on its own; wrap a fetch function to opt in.

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use tracing::debug;

use crate::cache::QueryKey;
use crate::query::FetchFn;

// == Retry Policy ==
/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    // == Wrap ==
    /// Returns a fetch function that retries retryable failures of `fetch`.
    ///
    /// Only [`QueryError::is_retryable`](crate::error::QueryError::is_retryable)
    /// errors are retried; the last error is returned once attempts run out.
    pub fn wrap(&self, fetch: FetchFn) -> FetchFn {
        let policy = self.clone();
        Arc::new(move |key: QueryKey| {
            let fetch = Arc::clone(&fetch);
            let policy = policy.clone();
            async move {
                let mut attempt = 0;
                loop {
                    match fetch(key.clone()).await {
                        Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                            let delay = policy.delay_for(attempt);
                            debug!(key = %key, attempt, ?delay, error = %error, "retrying fetch");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        outcome => return outcome,
                    }
                }
            }
            .boxed()
        })
    }
}

//! Flood-control aware retry policy.
//!
//! The remote platform answers bursts with "retry after S seconds". Short waits
//! are absorbed (sleep, then retry with a smaller request); long waits turn
//! into `Error::FloodWaitTooLong`, which callers report as a skip.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::{Error, Result};

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Abandon { wait: Duration },
    Fail,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Server-suggested waits at or above this are not waited out.
    pub abandon_threshold: Duration,
    /// Maps the server-suggested wait to the actual suspension.
    pub backoff: fn(Duration) -> Duration,
    /// Extracts the server-suggested wait from retryable errors.
    pub retryable: fn(&Error) -> Option<Duration>,
}

impl RetryPolicy {
    /// Policy for message-page fetches: one retry after `wait + 10s`, give up
    /// on waits of five minutes or more.
    pub fn flood_control() -> Self {
        Self {
            max_attempts: 2,
            abandon_threshold: Duration::from_secs(300),
            backoff: pad_ten_seconds,
            retryable: Error::flood_wait,
        }
    }

    /// Single attempt; failures surface immediately.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::flood_control()
        }
    }

    /// `attempt` is zero-based: the attempt that just failed.
    pub fn decide(&self, attempt: u32, err: &Error) -> RetryDecision {
        let Some(wait) = (self.retryable)(err) else {
            return RetryDecision::Fail;
        };
        if wait >= self.abandon_threshold {
            return RetryDecision::Abandon { wait };
        }
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry((self.backoff)(wait))
    }

    /// Run `op` under this policy. `op` receives the zero-based attempt number
    /// so it can shrink its request on retries.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            match self.decide(attempt, &err) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        what,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Flood control hit, backing off before retry"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Abandon { wait } => {
                    warn!(what, wait_secs = wait.as_secs(), "Flood wait too long, abandoning");
                    return Err(Error::FloodWaitTooLong {
                        seconds: wait.as_secs(),
                    });
                }
                RetryDecision::Fail => return Err(err),
            }
        }
    }
}

fn pad_ten_seconds(wait: Duration) -> Duration {
    wait + Duration::from_secs(10)
}

/// Page size for a given attempt: the original size first, then half of it
/// (never below one).
pub fn page_size_for_attempt(limit: usize, attempt: u32) -> usize {
    if attempt == 0 {
        limit.max(1)
    } else {
        (limit / 2).max(1)
    }
}

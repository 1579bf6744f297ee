//! Bounded retry with time-based backoff.
//!
//! Every attempt runs under its own timeout; an elapsed timeout surfaces as
//! `BrowserError::Timeout` to the retry loop like any other failure.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

use crate::browser::BrowserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `backoff × attempt`
    #[default]
    Linear,
    /// `backoff × 2^(attempt-1)`, capped at `max_backoff_ms`
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            strategy: BackoffStrategy::Linear,
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
            ..Self::default()
        }
    }

    /// Short per-record policy
    pub fn record_default() -> Self {
        Self::linear(2, 250)
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = match self.strategy {
            BackoffStrategy::Linear => self.backoff_ms.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                self.backoff_ms
                    .saturating_mul(factor)
                    .min(self.max_backoff_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

/// Result of a retried operation together with the attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempt: u32,
}

/// All attempts failed; `last_error` is the final failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: BrowserError,
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last_error)
    }
}

impl std::error::Error for RetryExhausted {}

/// Run `op` up to `policy.max_attempts` times, each bounded by `per_attempt`.
///
/// `on_retry(attempt, delay, error)` is called before each backoff sleep.
pub async fn retry_with_backoff<T, F, Fut, R>(
    policy: &RetryPolicy,
    per_attempt: Duration,
    operation: &str,
    mut op: F,
    mut on_retry: R,
) -> Result<Attempted<T>, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BrowserError>>,
    R: FnMut(u32, Duration, &BrowserError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = BrowserError::Other(format!("{}: no attempt made", operation));

    for attempt in 1..=max_attempts {
        let outcome = match timeout(per_attempt, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::timeout(operation, per_attempt)),
        };

        match outcome {
            Ok(value) => return Ok(Attempted { value, attempt }),
            Err(e) => {
                if attempt < max_attempts {
                    let delay = policy.delay_after(attempt);
                    on_retry(attempt, delay, &e);
                    sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    Err(RetryExhausted {
        attempts: max_attempts,
        last_error,
    })
}

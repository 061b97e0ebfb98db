//! Bounded retry and polling helpers.
//!
//! Every loop here has an explicit attempt ceiling; nothing retries forever.

use std::future::Future;
use std::time::Duration;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Multiplier applied to `delay` after each failed attempt.
    pub backoff: u32,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: 1,
        }
    }

    pub const fn exponential(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: 2,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(500))
    }
}

/// Runs `check` until it yields `Some`, sleeping between attempts.
pub async fn poll_until<T, F, Fut>(policy: RetryPolicy, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        if let Some(value) = check().await {
            return Some(value);
        }
        if attempt < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }
    None
}

/// Retries `op` while `retryable` accepts the error, up to the policy ceiling.
pub async fn retry_async<T, F, Fut, R>(
    policy: RetryPolicy,
    mut op: F,
    retryable: R,
) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
    R: Fn(&PortError) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && retryable(&err) => {
                tracing::debug!(attempt, error = %err, "retrying after transient failure");
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

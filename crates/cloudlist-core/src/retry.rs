//! Retry with exponential backoff for upstream API calls

use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

/// Transport-level retry settings, from the `[http]` config section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::ZERO,
    };
}

/// Exponential backoff: `base * 2^(attempt-1)` (1s, 2s, 4s, ... for a 1s base)
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Retry a fallible async call with exponential backoff.
///
/// Only [`ApiError::is_retryable`] errors are retried, up to
/// `policy.max_retries` times. Returns the first success, or the final error.
/// Dropping the returned future (e.g. on cancellation) abandons any pending
/// backoff sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut attempt_fn: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(policy.base_delay, attempt);
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {}ms",
                    policy.max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    log::warn!("{label}: failed after {} attempts: {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}

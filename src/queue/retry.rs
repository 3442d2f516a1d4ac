//! Retry classification and exponential backoff

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::QueueError;

/// Classifies a work failure as retryable
pub trait TransientError {
    /// True for rate limiting and network-level hiccups
    fn is_transient(&self) -> bool;
}

/// How often and how patiently a failed work item is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait before the given 1-indexed attempt
    ///
    /// Attempt 1 runs immediately; attempt `n >= 2` waits `base_delay * 2^(n-2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `work` until it succeeds, fails permanently, or runs out of attempts.
///
/// Cancellation is checked before every attempt and races every backoff wait.
/// A failure observed after cancellation is reported as `Cancelled`.
pub(crate) async fn run_with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut work: F,
) -> Result<T, QueueError<E>>
where
    E: TransientError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        let error = match work().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        if !error.is_transient() || attempt >= policy.max_attempts() {
            debug!("Giving up after {} attempt(s)", attempt);
            return Err(QueueError::Failed {
                attempts: attempt,
                source: error,
            });
        }

        attempt += 1;
        let delay = policy.delay_before(attempt);
        warn!(
            "Transient failure, retrying in {:?} (attempt {}/{})",
            delay,
            attempt,
            policy.max_attempts()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1000)]
    #[case(3, 2000)]
    #[case(4, 4000)]
    #[case(5, 8000)]
    fn delay_before_doubles_per_attempt(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(
            policy.delay_before(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn max_attempts_counts_first_try() {
        assert_eq!(RetryPolicy::new(3, Duration::ZERO).max_attempts(), 4);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn delay_before_saturates_for_huge_attempts() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(
            policy.delay_before(200),
            Duration::from_secs(1).saturating_mul(u32::MAX)
        );
    }
}

//! Delivery retry strategies

use contracts::RetryConfig;
use std::time::Duration;

/// Decides whether and when a failed delivery is attempted again
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt after `failures` consecutive failures,
    /// or `None` to give up.
    fn next_delay(&self, failures: u32) -> Option<Duration>;
}

/// Doubling backoff with a cap and a bounded number of attempts
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial,
            max,
        }
    }
}

impl From<&RetryConfig> for ExponentialBackoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

/// Never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&self, _failures: u32) -> Option<Duration> {
        None
    }
}

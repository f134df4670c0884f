use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Exponential backoff schedule for per-token retry attempts.
///
/// The policy is a pure function of the attempt index and its fixed
/// parameters; callers own the actual sleeping so tests can assert the
/// schedule without a clock.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    growth_factor: u32,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        base_delay: Duration,
        growth_factor: u32,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            growth_factor: growth_factor.max(1),
            max_delay,
        }
    }

    /// Delay scheduled after the given 1-indexed attempt fails:
    /// `base_delay * growth_factor^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.base_delay.min(self.max_delay);
        }

        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let delay = match self.growth_factor.checked_pow(exponent) {
            Some(multiplier) => self.base_delay.saturating_mul(multiplier),
            None => self.max_delay,
        };

        delay.min(self.max_delay)
    }

    /// True once the attempt index exceeds the configured budget.
    pub fn is_exhausted(&self, attempt: usize) -> bool {
        attempt > self.max_attempts
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

/// Sleeps for `delay` unless the token is cancelled first.
///
/// A zero delay still yields so sibling fetchers in the same batch get
/// polled.
pub(crate) async fn sleep_with_cancellation(
    delay: Duration,
    cancellation: &CancellationToken,
) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    tokio::select! {
        _ = cancellation.cancelled() => Err(anyhow!("scan cancelled")),
        _ = sleep(delay) => Ok(()),
    }
}

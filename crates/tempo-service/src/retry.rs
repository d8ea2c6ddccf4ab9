use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounded exponential backoff applied around the command workflow at
/// the subscription boundary: only after `max_attempts` failures does
/// the error escape to the broker as a nak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            factor: 2,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, factor: u32, max_attempts: u32) -> Self {
        Self {
            base_delay,
            factor,
            // At least one attempt, or `run` would never call the operation.
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before the retry following failed attempt `attempt`
    /// (1-based): `base_delay * factor^(attempt - 1)`.
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * self.factor.saturating_pow(attempt - 1)
    }

    /// Run `op` up to `max_attempts` times, sleeping between attempts.
    /// Returns the first success or the last error.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= self.max_attempts => return Err(error),
                Err(error) => {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry with a fixed delay between attempts. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same attempt count, no waiting. Used by tests.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// The last attempt's error is returned unchanged. Cancellation is
    /// observed between attempts only: an attempt in flight runs to
    /// completion, and a cancelled wait returns the error that preceded it.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts || cancel.is_cancelled() => return Err(e),
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "retrying...");
                    tokio::select! {
                        () = tokio::time::sleep(self.delay) => {}
                        () = cancel.cancelled() => return Err(e),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

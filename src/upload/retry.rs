//! Bounded exponential-backoff retry

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INITIAL_DELAY};
use crate::error::{UploadError, UploadResult};

/// Retry settings: total attempts and the first backoff delay (doubled per retry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INITIAL_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Run `operation` until it succeeds, fails with `Cancelled`, or attempts run out.
    ///
    /// The backoff wait races against `cancel`, so a cancellation during the delay
    /// returns immediately instead of sleeping out the remaining time.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> UploadResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UploadResult<T>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }

            warn!(
                "Request failed (attempt {}/{}, {}): {}, retrying in {}ms...",
                attempt,
                self.max_attempts,
                failure_kind(&err),
                err,
                delay.as_millis()
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }
}

/// Classification label for retry diagnostics
fn failure_kind(err: &UploadError) -> &'static str {
    err.error_type().map_or("other", |kind| kind.as_str())
}

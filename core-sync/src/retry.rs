//! # Retry Policy
//!
//! Bounded exponential backoff driven by [`ErrorKind`].
//!
//! Rate-limited and transient failures are retried up to `max_retries`
//! times after the first attempt. Before retry `n` (0-based) the policy waits
//! `base_delay * 2^n`, raised to the server's `Retry-After` hint when that is
//! larger, never shorter than the previous wait and never longer than
//! `max_delay`. Auth and permanent failures return immediately.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: BridgeResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>, previous: Duration) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let exponential = self.base_delay.saturating_mul(factor);
        let wanted = match hint {
            Some(hint) => exponential.max(hint),
            None => exponential,
        };
        wanted.max(previous).min(self.max_delay)
    }

    pub fn should_retry(&self, kind: ErrorKind, attempts_so_far: u32) -> bool {
        kind.is_retryable() && attempts_so_far < self.max_attempts()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Cancellation interrupts the backoff wait and
    /// yields `BridgeError::Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        let mut attempts = 0u32;
        let mut previous = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Attempted {
                    result: Err(BridgeError::Cancelled),
                    attempts,
                };
            }

            attempts += 1;
            let err = match op().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if matches!(err, BridgeError::Cancelled) || !self.should_retry(kind, attempts) {
                if kind.is_retryable() {
                    warn!(operation, attempts, error = %err, "Retries exhausted");
                }
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.delay_for(attempts - 1, err.retry_after(), previous);
            previous = delay;
            debug!(
                operation,
                attempt = attempts,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Attempted {
                        result: Err(BridgeError::Cancelled),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

use core::{fmt, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, SleepProvider, StoreError, TokioSleep};

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// After failed attempt `i` (1-based) wait `unit * 2^i`.
    Exponential { unit: Duration },
}

impl Backoff {
    /// Delay to apply after `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Exponential { unit } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                unit.saturating_mul(factor)
            }
        }
    }
}

/// Attempt budget and backoff for one class of store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Relational store reads and writes: 3 attempts, 2ms then 4ms apart.
    pub const DURABLE: Self = Self {
        max_attempts: 3,
        backoff: Backoff::Exponential {
            unit: Duration::from_millis(1),
        },
    };

    /// Cache reads on the request path: 3 attempts, 2ms then 4ms apart.
    pub const CACHE_READ: Self = Self {
        max_attempts: 3,
        backoff: Backoff::Exponential {
            unit: Duration::from_millis(1),
        },
    };

    /// Background cache writes: 5 attempts, 2/4/8/16ms apart.
    pub const CACHE: Self = Self {
        max_attempts: 5,
        backoff: Backoff::Exponential {
            unit: Duration::from_millis(1),
        },
    };

    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Why a resilient execution gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last_error: E,
    },
    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled {
        operation: &'static str,
        attempts: u32,
    },
}

impl From<RetryError<StoreError>> for Error {
    fn from(err: RetryError<StoreError>) -> Self {
        match err {
            RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            } => Self::StoreUnavailable {
                operation,
                attempts,
                source: last_error,
            },
            RetryError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

/// Retry-with-backoff executor shared by every store-touching operation.
///
/// Every error is retried the same way; the closure decides what counts as an
/// error. Success returns immediately and no delay follows the final attempt.
#[derive(Debug, Clone, Default)]
pub struct Resilient<S = TokioSleep> {
    sleeper: S,
}

impl<S> Resilient<S>
where
    S: SleepProvider,
{
    pub fn new(sleeper: S) -> Self {
        Self { sleeper }
    }

    /// Runs `f` until it succeeds or the policy's attempt budget is spent.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        policy: RetryPolicy,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(operation, policy, None, f).await
    }

    /// Like [`Resilient::run`], but checks `token` before every attempt and
    /// abandons any backoff sleep as soon as it is cancelled.
    pub async fn run_cancellable<T, E, F, Fut>(
        &self,
        operation: &'static str,
        policy: RetryPolicy,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(operation, policy, Some(token), f).await
    }

    async fn execute<T, E, F, Fut>(
        &self,
        operation: &'static str,
        policy: RetryPolicy,
        cancel: Option<&CancellationToken>,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(operation, attempts = attempt, "retry loop cancelled");
                return Err(RetryError::Cancelled {
                    operation,
                    attempts: attempt,
                });
            }

            attempt += 1;
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                return Err(RetryError::Exhausted {
                    operation,
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = policy.backoff.delay_after(attempt);
            debug!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => {
                            debug!(operation, attempts = attempt, "retry loop cancelled during backoff");
                            return Err(RetryError::Cancelled { operation, attempts: attempt });
                        }
                        () = self.sleeper.sleep_for(delay) => {}
                    }
                }
                None => self.sleeper.sleep_for(delay).await,
            }
        }
    }
}

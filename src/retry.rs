//! Retry with exponential backoff, shared by job submission and status polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::clock::Clock;

/// A doubling delay schedule with a ceiling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
}

impl Backoff {
    /// Creates a schedule starting at `base`, never exceeding `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after the `step`-th failure (zero based): `base * 2^step`, capped.
    pub fn delay(&self, step: u32) -> Duration {
        let factor = 2u32.checked_pow(step).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// How many times to try and how long to wait between tries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

/// A wall-clock allowance measured from a fixed start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Budget {
    /// When the clock started running.
    pub started_at: Instant,
    /// Total time allowed.
    pub limit: Duration,
}

impl Budget {
    /// A budget of `limit` starting at `started_at`.
    pub fn new(started_at: Instant, limit: Duration) -> Self {
        Self { started_at, limit }
    }

    /// Time used so far.
    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.started_at)
    }

    /// Time left, zero once spent.
    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.limit.saturating_sub(self.elapsed(clock))
    }
}

/// Why a retried operation finally failed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate refused to retry.
    Permanent(E),
    /// Every attempt failed with a transient error; holds the last one.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: E,
    },
    /// The budget ran out, either mid-attempt or before the next one.
    OutOfTime {
        /// Attempts started.
        attempts: u32,
        /// The last transient error seen, if any attempt finished.
        last: Option<E>,
    },
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent(err) => write!(f, "{err}"),
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::OutOfTime {
                attempts,
                last: Some(last),
            } => write!(f, "ran out of time after {attempts} attempts: {last}"),
            Self::OutOfTime {
                attempts,
                last: None,
            } => write!(f, "ran out of time after {attempts} attempts"),
        }
    }
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, fails permanently, runs out of
    /// attempts or runs out of `budget`.
    ///
    /// Each attempt is raced against the remaining budget and dropped if the
    /// budget ends first. No backoff sleep is started that would end past the
    /// budget. All waiting goes through `clock`.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        clock: &dyn Clock,
        budget: Budget,
        label: &str,
        is_transient: P,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        let mut last = None;
        loop {
            let remaining = budget.remaining(clock);
            if remaining.is_zero() {
                return Err(RetryError::OutOfTime {
                    attempts: attempt - 1,
                    last,
                });
            }

            let outcome = tokio::select! {
                biased;
                outcome = operation() => outcome,
                () = clock.sleep(remaining) => {
                    warn!("{label} attempt {attempt} still running when the budget ran out");
                    return Err(RetryError::OutOfTime { attempts: attempt, last });
                }
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !is_transient(&err) => return Err(RetryError::Permanent(err)),
                Err(err) => err,
            };
            let remaining = budget.remaining(clock);
            if remaining.is_zero() {
                return Err(RetryError::OutOfTime {
                    attempts: attempt,
                    last: Some(err),
                });
            }
            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.backoff.delay(attempt - 1);
            if delay >= remaining {
                warn!(
                    "{label} attempt {attempt}/{max_attempts} failed with {}ms left, not retrying: {err}",
                    remaining.as_millis()
                );
                return Err(RetryError::OutOfTime {
                    attempts: attempt,
                    last: Some(err),
                });
            }
            warn!(
                "{label} attempt {attempt}/{max_attempts} failed, retrying in {}ms: {err}",
                delay.as_millis()
            );
            clock.sleep(delay).await;
            last = Some(err);
            attempt += 1;
        }
    }
}

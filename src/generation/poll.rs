//! Waiting for a job to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::constants::CANCEL_TIMEOUT;
use crate::error::GenerateError;
use crate::job::{Job, JobStatus};
use crate::provider::{JobProvider, ProviderError};
use crate::retry::{Backoff, Budget, RetryError, RetryPolicy};

/// Polling cadence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollConfig {
    /// Sleep schedule between status queries.
    pub interval: Backoff,
    /// Retries for a single failed status query.
    pub status_retry: RetryPolicy,
}

/// Queries a job until it finishes or its deadline passes.
#[derive(Clone, Debug)]
pub struct Poller {
    provider: Arc<dyn JobProvider>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl Poller {
    /// A poller for jobs on `provider`.
    pub fn new(provider: Arc<dyn JobProvider>, clock: Arc<dyn Clock>, config: PollConfig) -> Self {
        Self {
            provider,
            clock,
            config,
        }
    }

    /// Polls `job` until it reaches a terminal status.
    ///
    /// Success returns the final snapshot. A failed or canceled job, or a
    /// status query that keeps failing, ends the poll with an error. Running
    /// out of `deadline` (measured from `submitted_at`) ends it with a
    /// timeout, including while a status query is still in flight or being
    /// retried; one cancel call is made first and its outcome is only logged.
    pub async fn poll_until_terminal(
        &self,
        job: &Job,
        submitted_at: Instant,
        deadline: Duration,
    ) -> Result<Job, GenerateError> {
        let budget = Budget::new(submitted_at, deadline);
        let mut step = 0;
        loop {
            let queried = self
                .config
                .status_retry
                .run(
                    self.clock.as_ref(),
                    budget,
                    "status query",
                    ProviderError::is_transient,
                    || self.provider.get_job(&job.id),
                )
                .await;
            let current = match queried {
                Ok(current) => current,
                Err(RetryError::OutOfTime { attempts, last }) => {
                    info!(
                        "Job {} ran out of time after {}ms during status query attempt {}, canceling",
                        job.id,
                        budget.elapsed(self.clock.as_ref()).as_millis(),
                        attempts
                    );
                    if let Some(err) = last {
                        debug!("Last status error for job {}: {err}", job.id);
                    }
                    return self.time_out(&job.id).await;
                }
                Err(err) => return Err(GenerateError::Poll(err)),
            };

            match current.status {
                JobStatus::Succeeded => {
                    debug!("Job {} succeeded after {} polls", job.id, step + 1);
                    return Ok(current);
                }
                JobStatus::Failed => {
                    return Err(GenerateError::Generation(current.error));
                }
                JobStatus::Canceled => return Err(GenerateError::Canceled),
                JobStatus::Pending | JobStatus::Running => {}
            }

            let remaining = budget.remaining(self.clock.as_ref());
            if remaining.is_zero() {
                info!(
                    "Job {} still {} after {}ms, canceling",
                    job.id,
                    current.status,
                    budget.elapsed(self.clock.as_ref()).as_millis()
                );
                return self.time_out(&job.id).await;
            }

            let delay = self.config.interval.delay(step).min(remaining);
            debug!(
                "Job {} is {}, checking again in {}ms",
                job.id,
                current.status,
                delay.as_millis()
            );
            self.clock.sleep(delay).await;
            step = step.saturating_add(1);
        }
    }

    /// Best-effort cancel, bounded by [`CANCEL_TIMEOUT`], then a timeout.
    async fn time_out(&self, id: &str) -> Result<Job, GenerateError> {
        tokio::select! {
            biased;
            outcome = self.provider.cancel_job(id) => match outcome {
                Ok(()) => debug!("Canceled job {id}"),
                Err(err) => warn!("Failed to cancel job {id}: {err}"),
            },
            () = self.clock.sleep(CANCEL_TIMEOUT) => {
                warn!("Cancel for job {id} got no answer in {}ms", CANCEL_TIMEOUT.as_millis());
            }
        }
        Err(GenerateError::Timeout)
    }
}

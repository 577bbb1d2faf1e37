//! Job creation with retries on provider throttling.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::GenerateError;
use crate::job::{Job, JobInput};
use crate::provider::{JobProvider, ProviderError};
use crate::retry::{Budget, RetryError, RetryPolicy};

/// Creates jobs, retrying transient failures.
///
/// A retry after a lost success response can create a duplicate job; the
/// provider has no idempotency key for us to send.
#[derive(Clone, Debug)]
pub struct Submitter {
    provider: Arc<dyn JobProvider>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl Submitter {
    /// A submitter using `policy` between attempts.
    pub fn new(provider: Arc<dyn JobProvider>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            clock,
            policy,
        }
    }

    /// Creates one job from `input` within `budget`.
    ///
    /// Running out of budget mid-attempt or between attempts is a timeout;
    /// there is no job id yet, so nothing is canceled.
    pub async fn submit(&self, input: &JobInput, budget: Budget) -> Result<Job, GenerateError> {
        let job = self
            .policy
            .run(
                self.clock.as_ref(),
                budget,
                "job submission",
                ProviderError::is_transient,
                || self.provider.create_job(input),
            )
            .await
            .map_err(|err| match err {
                RetryError::OutOfTime { .. } => {
                    warn!("Job submission ran out of time: {err}");
                    GenerateError::Timeout
                }
                other => GenerateError::Submission(other),
            })?;
        debug!("Created job {} ({})", job.id, job.status);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::job::JobStatus;
    use crate::provider::testing::ScriptedProvider;
    use crate::retry::Backoff;
    use std::time::Duration;

    fn submitter(provider: &Arc<ScriptedProvider>, clock: &Arc<ManualClock>) -> Submitter {
        Submitter::new(
            provider.clone(),
            clock.clone(),
            RetryPolicy {
                max_attempts: 4,
                backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(3)),
            },
        )
    }

    fn roomy(clock: &ManualClock) -> Budget {
        Budget::new(clock.now(), Duration::from_secs(55))
    }

    fn throttled() -> Result<Job, ProviderError> {
        Err(ProviderError::Throttled("429 Too Many Requests".into()))
    }

    #[tokio::test]
    async fn throttled_submissions_back_off_and_retry() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_create(throttled());
        provider.push_create(throttled());
        provider.push_create(Ok(Job::new("job-9", JobStatus::Pending)));
        let clock = Arc::new(ManualClock::new());

        let job = submitter(&provider, &clock)
            .submit(&JobInput::default(), roomy(&clock))
            .await
            .expect("submit");
        assert_eq!(job.id, "job-9");
        assert_eq!(provider.create_calls(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_cause() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_create(throttled());
        }
        provider.push_create(Err(ProviderError::Unavailable {
            status: 503,
            message: "last one".into(),
        }));
        let clock = Arc::new(ManualClock::new());

        let err = submitter(&provider, &clock)
            .submit(&JobInput::default(), roomy(&clock))
            .await
            .expect_err("should fail");
        match err {
            GenerateError::Submission(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(last, ProviderError::Unavailable { status: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_create(Err(ProviderError::Rejected {
            status: 401,
            message: "Invalid token".into(),
        }));
        let clock = Arc::new(ManualClock::new());

        let err = submitter(&provider, &clock)
            .submit(&JobInput::default(), roomy(&clock))
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            GenerateError::Submission(RetryError::Permanent(ProviderError::Rejected { .. }))
        ));
        assert_eq!(provider.create_calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn throttling_that_outlasts_the_budget_is_a_timeout() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..4 {
            provider.push_create(throttled());
        }
        let clock = Arc::new(ManualClock::new());
        let budget = Budget::new(clock.now(), Duration::from_secs(2));

        let err = submitter(&provider, &clock)
            .submit(&JobInput::default(), budget)
            .await
            .expect_err("should fail");
        assert!(matches!(err, GenerateError::Timeout));
        assert_eq!(provider.create_calls(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }
}

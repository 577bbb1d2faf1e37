//! The request pipeline: validate, rate limit, submit, poll, normalize.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::clock::Clock;
use crate::constants::{
    DEFAULT_GENERATION_DEADLINE, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_POLL_BASE_INTERVAL,
    DEFAULT_POLL_MAX_INTERVAL, DEFAULT_STATUS_BASE_DELAY, DEFAULT_STATUS_MAX_ATTEMPTS,
    DEFAULT_STATUS_MAX_DELAY, DEFAULT_SUBMIT_BASE_DELAY, DEFAULT_SUBMIT_MAX_ATTEMPTS,
    DEFAULT_SUBMIT_MAX_DELAY,
};
use crate::error::GenerateError;
use crate::job::JobInput;
use crate::prompt::Vibe;
use crate::provider::JobProvider;
use crate::ratelimit::RateLimiter;
use crate::retry::{Backoff, Budget, RetryPolicy};
use crate::validate::parse_image_ref;

mod output;
mod poll;
mod submit;

pub use output::extract_output;
pub use poll::{PollConfig, Poller};
pub use submit::Submitter;

/// Tuning for one generation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GenerationConfig {
    /// Wall-clock budget from the first submission attempt.
    pub deadline: Duration,
    /// Retries for job creation.
    pub submit_retry: RetryPolicy,
    /// Poll cadence and status query retries.
    pub poll: PollConfig,
    /// Largest decoded inline image, in bytes.
    pub max_image_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_GENERATION_DEADLINE,
            submit_retry: RetryPolicy {
                max_attempts: DEFAULT_SUBMIT_MAX_ATTEMPTS,
                backoff: Backoff::new(DEFAULT_SUBMIT_BASE_DELAY, DEFAULT_SUBMIT_MAX_DELAY),
            },
            poll: PollConfig {
                interval: Backoff::new(DEFAULT_POLL_BASE_INTERVAL, DEFAULT_POLL_MAX_INTERVAL),
                status_retry: RetryPolicy {
                    max_attempts: DEFAULT_STATUS_MAX_ATTEMPTS,
                    backoff: Backoff::new(DEFAULT_STATUS_BASE_DELAY, DEFAULT_STATUS_MAX_DELAY),
                },
            },
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// What the caller asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Data URI or https URL of the source photo.
    pub image_data: String,
    /// Scene to restage the photo into.
    pub vibe: Vibe,
}

/// A finished generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Provider job handle.
    pub job_id: String,
    /// Reference to the generated image.
    pub output: String,
}

/// Runs generations against one provider, sharing one rate limiter.
#[derive(Clone, Debug)]
pub struct GenerationService {
    provider: Option<Arc<dyn JobProvider>>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    config: GenerationConfig,
}

impl GenerationService {
    /// A service; with no provider every request fails with a config error.
    pub fn new(
        provider: Option<Arc<dyn JobProvider>>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            clock,
            config,
        }
    }

    /// The shared limiter, for housekeeping.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Turns one request into one output reference, or a typed failure.
    #[instrument(skip_all, fields(client = %client_key, vibe = %request.vibe))]
    pub async fn generate(
        &self,
        client_key: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerateError> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(GenerateError::Config);
        };

        parse_image_ref(&request.image_data, self.config.max_image_bytes)?;

        if !self.limiter.check_and_consume(client_key).await {
            return Err(GenerateError::RateLimited);
        }

        let input = JobInput::for_vibe(request.vibe, &request.image_data);
        let budget = Budget::new(self.clock.now(), self.config.deadline);
        let job = Submitter::new(provider.clone(), self.clock.clone(), self.config.submit_retry)
            .submit(&input, budget)
            .await?;
        info!("Submitted job {} to {}", job.id, provider.name());

        let finished = Poller::new(provider.clone(), self.clock.clone(), self.config.poll)
            .poll_until_terminal(&job, budget.started_at, budget.limit)
            .await?;
        let output = extract_output(&finished)?;
        info!("Job {} produced {}", finished.id, output);

        Ok(GenerationOutcome {
            job_id: finished.id,
            output,
        })
    }
}

//! The generation provider seam: create, inspect and cancel jobs.

use async_trait::async_trait;

use crate::job::{Job, JobInput};

pub mod replicate;

pub use replicate::ReplicateClient;

/// Errors from a single provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider asked us to slow down (HTTP 429 or a throttling message).
    Throttled(String),
    /// The provider had a server-side failure (HTTP 5xx).
    Unavailable {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },
    /// The request never got a response (connect failure, timeout).
    Transport(String),
    /// The provider refused the request (bad input, auth).
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },
    /// The provider answered with something we could not understand.
    Malformed(String),
}

impl ProviderError {
    /// Whether trying the same call again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Unavailable { .. } | Self::Transport(_)
        )
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Throttled(message) => write!(f, "provider throttled request: {message}"),
            Self::Unavailable { status, message } => {
                write!(f, "provider unavailable ({status}): {message}")
            }
            Self::Transport(message) => write!(f, "provider request failed: {message}"),
            Self::Rejected { status, message } => {
                write!(f, "provider rejected request ({status}): {message}")
            }
            Self::Malformed(message) => write!(f, "unexpected provider response: {message}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// An external asynchronous job API.
#[async_trait]
pub trait JobProvider: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Creates a new job from an opaque parameter bag.
    async fn create_job(&self, input: &JobInput) -> Result<Job, ProviderError>;

    /// Fetches the current snapshot of a job.
    async fn get_job(&self, id: &str) -> Result<Job, ProviderError>;

    /// Asks the provider to stop a job. Best effort.
    async fn cancel_job(&self, id: &str) -> Result<(), ProviderError>;
}

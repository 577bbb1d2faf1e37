//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info, warn};

use crate::provider::ProviderError;
use crate::retry::RetryError;
use crate::validate::InvalidImage;

/// Everything that can end a generation request early.
#[derive(Debug)]
pub enum GenerateError {
    /// Malformed or oversized input.
    Validation(String),
    /// Client used up its quota.
    RateLimited,
    /// Could not create the job.
    Submission(RetryError<ProviderError>),
    /// Could not read the job's status.
    Poll(RetryError<ProviderError>),
    /// The job ran and failed; holds the provider's message if it gave one.
    Generation(Option<String>),
    /// The job was canceled.
    Canceled,
    /// The job was still running when the deadline passed.
    Timeout,
    /// The job succeeded but produced no usable output reference.
    EmptyResult,
    /// The provider isn't configured.
    Config,
    /// Anything else.
    Internal(String),
}

impl GenerateError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Submission(_)
            | Self::Poll(_)
            | Self::Generation(_)
            | Self::Canceled
            | Self::EmptyResult
            | Self::Config
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Provider internals stay in the logs,
    /// except a failed job's own message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::RateLimited => "Too many requests. Please wait a minute and try again.".into(),
            Self::Submission(_) => "Could not start generation. Please try again.".into(),
            Self::Poll(_) => "Lost track of the generation. Please try again.".into(),
            Self::Generation(Some(message)) => format!(
                "AI generation failed ({message}). Please try a different photo."
            ),
            Self::Generation(None) => {
                "AI generation failed. Please try a different photo.".into()
            }
            Self::Canceled => "Generation was canceled. Please try again.".into(),
            Self::Timeout => "Generation timed out. Please try again.".into(),
            Self::EmptyResult => "Empty result from model.".into(),
            Self::Config => "API Config Error".into(),
            Self::Internal(_) => "Server error. Please try again.".into(),
        }
    }
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Submission(err) => write!(f, "job submission failed: {err}"),
            Self::Poll(err) => write!(f, "job status query failed: {err}"),
            Self::Generation(Some(message)) => write!(f, "job failed: {message}"),
            Self::Generation(None) => write!(f, "job failed"),
            Self::Canceled => write!(f, "job canceled"),
            Self::Timeout => write!(f, "job timed out"),
            Self::EmptyResult => write!(f, "job returned no output"),
            Self::Config => write!(f, "provider API token is not configured"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for GenerateError {}

impl From<InvalidImage> for GenerateError {
    fn from(err: InvalidImage) -> Self {
        GenerateError::Validation(err.to_string())
    }
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        match &self {
            Self::Validation(_) | Self::RateLimited => info!("Rejected request: {self}"),
            Self::Generation(_) | Self::Canceled | Self::Timeout | Self::EmptyResult => {
                warn!("Generation failed: {self}")
            }
            Self::Submission(_) | Self::Poll(_) | Self::Config | Self::Internal(_) => {
                error!("Generation error: {self}")
            }
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

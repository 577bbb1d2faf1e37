//! Replicate predictions API client.
//!
//! Docs: <https://replicate.com/docs/reference/http>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{JobProvider, ProviderError};
use crate::job::{Job, JobInput, JobStatus};

/// Longest slice of a response body we keep in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Talks to Replicate's predictions endpoints.
#[derive(Clone, Debug)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl From<PredictionResponse> for Job {
    fn from(prediction: PredictionResponse) -> Self {
        let error = match prediction.error {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message),
            Some(other) => Some(other.to_string()),
        };
        Job {
            id: prediction.id,
            status: JobStatus::from_provider(&prediction.status),
            output: prediction.output.filter(|value| !value.is_null()),
            error,
        }
    }
}

impl ReplicateClient {
    /// Builds a client for `model` (`owner/name` or `owner/name:version`).
    pub fn new(
        api_base: &str,
        api_token: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("retrocam/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_token: api_token.trim().to_string(),
            model: model.trim().to_string(),
        })
    }

    /// Model identifier this client creates jobs for.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn create_request(&self, input: &JobInput) -> (String, Value) {
        match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, self.model),
                json!({ "input": input }),
            ),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_failure(status, &body))
        }
    }

    async fn send_for_job(&self, request: reqwest::RequestBuilder) -> Result<Job, ProviderError> {
        let body = self.send(request).await?;
        let prediction: PredictionResponse = serde_json::from_str(&body)
            .map_err(|err| ProviderError::Malformed(format!("{err}: {}", truncate(&body))))?;
        Ok(prediction.into())
    }
}

#[async_trait]
impl JobProvider for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn create_job(&self, input: &JobInput) -> Result<Job, ProviderError> {
        let (endpoint, payload) = self.create_request(input);
        debug!("Creating prediction via {endpoint}");
        self.send_for_job(self.http.post(&endpoint).json(&payload))
            .await
    }

    async fn get_job(&self, id: &str) -> Result<Job, ProviderError> {
        let endpoint = format!("{}/predictions/{}", self.api_base, id);
        self.send_for_job(self.http.get(&endpoint)).await
    }

    async fn cancel_job(&self, id: &str) -> Result<(), ProviderError> {
        let endpoint = format!("{}/predictions/{}/cancel", self.api_base, id);
        self.send(self.http.post(&endpoint)).await.map(|_| ())
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let message = truncate(body);
    if status == StatusCode::TOO_MANY_REQUESTS || body.to_ascii_lowercase().contains("throttl") {
        ProviderError::Throttled(message)
    } else if status.is_server_error() {
        ProviderError::Unavailable {
            status: status.as_u16(),
            message,
        }
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

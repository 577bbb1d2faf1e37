//! Generation jobs as seen from this side of the provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Lifecycle of a provider job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not started yet.
    Pending,
    /// Running on the provider.
    Running,
    /// Finished with a result.
    Succeeded,
    /// Finished without a usable result.
    Failed,
    /// Stopped before finishing.
    Canceled,
}

impl JobStatus {
    /// Maps a provider status string. Unknown values are treated as still
    /// running, so only the deadline can end them.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" | "pending" => Self::Pending,
            "processing" | "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" | "aborted" => Self::Canceled,
            other => {
                warn!("Unrecognised job status {other:?}, treating as running");
                Self::Running
            }
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(label)
    }
}

/// A snapshot of a provider job. The provider owns the real state; we only
/// ever replace snapshots with newer ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// Provider-assigned handle.
    pub id: String,
    /// Status at the time of the snapshot.
    pub status: JobStatus,
    /// Raw output, a single reference or a list of them.
    pub output: Option<Value>,
    /// Provider error message, if any.
    pub error: Option<String>,
}

impl Job {
    /// A snapshot with no output and no error.
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            output: None,
            error: None,
        }
    }

    /// Attaches a raw output value.
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Attaches a provider error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// The opaque parameter bag sent when creating a job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobInput(pub Map<String, Value>);

impl JobInput {
    /// Sets one parameter, replacing any previous value.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Looks up a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

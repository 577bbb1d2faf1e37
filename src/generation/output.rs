//! Picking the output reference out of a finished job.

use serde_json::Value;

use crate::error::GenerateError;
use crate::job::Job;

/// The job's output reference: the first element if the output is a list,
/// the value itself otherwise. Anything that isn't a non-empty string is
/// treated as no output.
pub fn extract_output(job: &Job) -> Result<String, GenerateError> {
    let candidate = match &job.output {
        Some(Value::Array(items)) => items.first(),
        other => other.as_ref(),
    };
    candidate
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .map(str::to_string)
        .ok_or(GenerateError::EmptyResult)
}

//! Shared constants/defaults for things
//!

use std::time::Duration;

/// Requests a single client may make inside one rate-limit window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 5;

/// Length of a rate-limit window.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Entry count at which the in-memory limiter sweeps out expired windows.
pub const RATE_LIMIT_PURGE_THRESHOLD: usize = 1024;

/// Bucket used when a request carries no forwarded-address headers.
pub const UNKNOWN_CLIENT_KEY: &str = "unknown";

/// Wall-clock budget for a job, measured from submission.
///
/// Sits under the 60 second request ceiling most hosting front ends enforce.
pub const DEFAULT_GENERATION_DEADLINE: Duration = Duration::from_secs(55);

/// First sleep between status polls.
pub const DEFAULT_POLL_BASE_INTERVAL: Duration = Duration::from_millis(500);

/// Longest sleep between status polls.
pub const DEFAULT_POLL_MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Attempts made to create a job before giving up.
pub const DEFAULT_SUBMIT_MAX_ATTEMPTS: u32 = 4;

/// First backoff after a throttled job submission.
pub const DEFAULT_SUBMIT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Longest backoff between job submission attempts.
pub const DEFAULT_SUBMIT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Attempts made for a single status query.
pub const DEFAULT_STATUS_MAX_ATTEMPTS: u32 = 3;

/// First backoff after a failed status query.
pub const DEFAULT_STATUS_BASE_DELAY: Duration = Duration::from_millis(250);

/// Longest backoff between status query attempts.
pub const DEFAULT_STATUS_MAX_DELAY: Duration = Duration::from_secs(1);

/// How long a best-effort cancel may take once the deadline has passed.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest decoded image we accept inline, in bytes.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Per-request HTTP timeout for provider calls.
pub const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default provider API root.
pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Default image model.
pub const DEFAULT_REPLICATE_MODEL: &str = "black-forest-labs/flux-dev";

/// Default sqlite path for the shared rate-limit store.
pub const DEFAULT_DATABASE_PATH: &str = "retrocam.sqlite";

#[cfg(test)]
/// A tiny but valid embedded jpeg reference used in tests
pub const TEST_IMAGE_DATA: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQAAAQABAAD/2wBDAAEBAQ==";

//! Time source used by the poller, the retry helper and the rate limiter.
//!
//! Everything that waits or measures elapsed time goes through [`Clock`], so
//! tests can swap in a manual clock and run long polling sequences instantly.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Monotonic time, wall-clock time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic "now", used for deadlines and in-memory windows.
    fn now(&self) -> Instant;

    /// Wall-clock "now", used where time is persisted.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Suspends the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The real clock, backed by tokio's timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;

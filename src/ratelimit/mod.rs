//! Per-client request quotas.
//!
//! A fixed number of requests per window, with the window restarting on the
//! first request after it expires. Attempts are counted, not successes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::clock::Clock;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Quota settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per client inside one window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

/// Backing store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limit store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError(err.to_string())
    }
}

/// Somewhere to keep per-client counters.
///
/// `check_and_consume` must be atomic per key: two concurrent callers must
/// never both see the last free slot.
#[async_trait]
pub trait RateLimitStore: Send + Sync + std::fmt::Debug {
    /// Counts one request for `client_key`; returns whether it is allowed.
    async fn check_and_consume(&self, client_key: &str) -> Result<bool, StoreError>;

    /// Drops entries whose window has passed, returning how many went.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// The limiter the request path talks to.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Wraps any store.
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// A limiter keeping its counters in process memory.
    pub fn in_memory(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStore::new(config, clock)))
    }

    /// Counts one request for `client_key`. Store failures are logged and
    /// the request is let through.
    pub async fn check_and_consume(&self, client_key: &str) -> bool {
        match self.store.check_and_consume(client_key).await {
            Ok(allowed) => {
                if !allowed {
                    debug!("Rate limit reached for {client_key}");
                }
                allowed
            }
            Err(err) => {
                error!("Rate limit check failed for {client_key}, allowing request: {err}");
                true
            }
        }
    }

    /// Sweeps expired entries.
    pub async fn purge_expired(&self) {
        match self.store.purge_expired().await {
            Ok(0) => {}
            Ok(count) => debug!("Purged {count} expired rate limit entries"),
            Err(err) => error!("Failed to purge rate limit entries: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn check_and_consume(&self, _client_key: &str) -> Result<bool, StoreError> {
            Err(StoreError("disk on fire".into()))
        }

        async fn purge_expired(&self) -> Result<u64, StoreError> {
            Err(StoreError("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_let_requests_through() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        assert!(limiter.check_and_consume("1.2.3.4").await);
        limiter.purge_expired().await;
    }
}

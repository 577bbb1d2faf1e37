//! Rate limit counters held in process memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{RateLimitConfig, RateLimitStore, StoreError};
use crate::clock::Clock;
use crate::constants::RATE_LIMIT_PURGE_THRESHOLD;

#[derive(Clone, Copy, Debug)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Counters in a mutex-guarded map. Each check is one critical section.
#[derive(Debug)]
pub struct MemoryStore {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn consume(&self, client_key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= RATE_LIMIT_PURGE_THRESHOLD {
            entries.retain(|_, entry| entry.window_reset_at > now);
        }

        match entries.get_mut(client_key) {
            Some(entry) if entry.window_reset_at > now => {
                if entry.count >= self.config.max_requests {
                    return false;
                }
                entry.count += 1;
                true
            }
            _ => {
                entries.insert(
                    client_key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        window_reset_at: now + self.config.window,
                    },
                );
                true
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn check_and_consume(&self, client_key: &str) -> Result<bool, StoreError> {
        Ok(self.consume(client_key))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.window_reset_at > now);
        Ok((before - entries.len()) as u64)
    }
}

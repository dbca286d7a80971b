//! Per-(source, identifier) admission control.
//!
//! Each key owns one `Mutex`-guarded window counter, so the admission
//! check and the counter increment happen under a single lock acquisition.
//! Windows reset lazily on the next check once `reset_time` passes.
//! Expired partitions are evicted when a new key is first seen, so the
//! in-memory map tracks only live counters; there is no background task.
//! State is written through to the key-value store with a one-window TTL
//! so counters survive a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::HookbusError;
use crate::models::{EventSource, RateLimitConfig, RateLimitState};
use crate::storage::KeyValueStore;

pub struct RateLimiter {
    config: RateLimitConfig,
    kv: Arc<dyn KeyValueStore>,
    partitions: RwLock<HashMap<String, Arc<Mutex<RateLimitState>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            kv,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.window_secs as i64)
    }

    /// Admission check for one inbound event.
    ///
    /// `Err(RateLimited)` is terminal for this attempt: the caller drops the
    /// event from this path instead of re-queueing it, so an overloaded
    /// source is not amplified by retries.
    pub async fn check(&self, source: EventSource, identifier: &str) -> Result<(), HookbusError> {
        let key = format!("{source}:{identifier}");
        let partition = self.partition(&key).await;
        let mut state = partition.lock().await;

        let now = Utc::now();
        if now >= state.reset_time {
            debug!(key = %key, "rate limit window reset");
            state.count = 0;
            state.blocked = false;
            state.reset_time = now + self.window();
        }

        state.count += 1;
        if state.count > self.config.limit {
            state.blocked = true;
        }
        let admitted = state.count <= self.config.limit + self.config.burst;

        // Write-through; admission decisions never fail on a storage error
        match serde_json::to_value(&*state) {
            Ok(value) => {
                if let Err(e) = self
                    .kv
                    .put(&format!("ratelimit/{key}"), value, Some(self.window()))
                    .await
                {
                    warn!(key = %key, error = %e, "failed to persist rate limit state");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "failed to serialize rate limit state"),
        }

        if admitted {
            Ok(())
        } else {
            warn!(key = %key, count = state.count, "rate limit exceeded");
            Err(HookbusError::RateLimited(key))
        }
    }

    /// Current window count, for tests and operator inspection
    pub async fn current_count(&self, source: EventSource, identifier: &str) -> u32 {
        let key = format!("{source}:{identifier}");
        let partitions = self.partitions.read().await;
        match partitions.get(&key) {
            Some(partition) => partition.lock().await.count,
            None => 0,
        }
    }

    async fn partition(&self, key: &str) -> Arc<Mutex<RateLimitState>> {
        {
            let partitions = self.partitions.read().await;
            if let Some(existing) = partitions.get(key) {
                return existing.clone();
            }
        }

        let mut partitions = self.partitions.write().await;
        if let Some(existing) = partitions.get(key) {
            return existing.clone();
        }

        // Evict expired windows while holding the write lock anyway; a key
        // mid-check keeps its entry
        let now = Utc::now();
        partitions.retain(|_, partition| match partition.try_lock() {
            Ok(state) => state.reset_time > now,
            Err(_) => true,
        });

        // First sight of this key in-process: recover a persisted window if
        // one is still live, else start fresh
        let state = match self.kv.get(&format!("ratelimit/{key}")).await {
            Ok(Some(value)) => serde_json::from_value(value)
                .unwrap_or_else(|_| RateLimitState::fresh(key, self.window())),
            Ok(None) => RateLimitState::fresh(key, self.window()),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to load rate limit state");
                RateLimitState::fresh(key, self.window())
            }
        };

        let partition = Arc::new(Mutex::new(state));
        partitions.insert(key.to_string(), partition.clone());
        partition
    }
}

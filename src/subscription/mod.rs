//! Subscription registry: the consumer-declared path to events,
//! independent of administrator-defined routes.
//!
//! A subscription matches when any of its filters matches (a subscriber
//! wants events satisfying at least one interest). Disabled subscriptions
//! are skipped without evaluation. This component is the sole owner of the
//! per-subscription delivery/error counters.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use crate::filter;
use crate::models::{EventData, EventSubscription};
use crate::storage::KeyValueStore;

#[derive(Clone)]
pub struct SubscriptionRegistry {
    kv: Arc<dyn KeyValueStore>,
}

impl SubscriptionRegistry {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn key(id: Uuid) -> String {
        format!("subscription/{id}")
    }

    pub async fn put(&self, subscription: &EventSubscription) -> Result<()> {
        self.kv
            .put(&Self::key(subscription.id), serde_json::to_value(subscription)?, None)
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<EventSubscription>> {
        match self.kv.get(&Self::key(id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<EventSubscription>> {
        let mut out = Vec::new();
        for (key, value) in self.kv.scan_prefix("subscription/").await? {
            match serde_json::from_value(value) {
                Ok(sub) => out.push(sub),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping undecodable subscription"),
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.kv.delete(&Self::key(id)).await
    }

    /// All enabled subscriptions interested in this event.
    ///
    /// OR across filters; a subscription with no filters at all is treated
    /// as interested in everything, mirroring catch-all routes.
    pub async fn matching(&self, event: &EventData) -> Result<Vec<EventSubscription>> {
        let mut matched = Vec::new();
        for sub in self.list().await? {
            if !sub.enabled {
                continue;
            }
            let interested = sub.filters.is_empty()
                || sub
                    .filters
                    .iter()
                    .any(|f| f.enabled && filter::matches(&event.payload, &f.conditions));
            if interested {
                debug!(subscription = %sub.id, agent = %sub.agent_id, event_id = %event.id, "subscription matched");
                matched.push(sub);
            }
        }
        Ok(matched)
    }

    /// Record one delivery attempt outcome. Called exactly once per attempt
    /// by the delivery queue.
    pub async fn record_outcome(&self, id: Uuid, success: bool) -> Result<()> {
        let Some(mut sub) = self.get(id).await? else {
            // Subscription deleted while a delivery was in flight
            return Ok(());
        };
        if success {
            sub.delivery_count += 1;
        } else {
            sub.error_count += 1;
        }
        sub.updated_at = chrono::Utc::now();
        self.put(&sub).await
    }
}

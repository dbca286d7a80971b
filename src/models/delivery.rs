use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventData;
use super::route::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Attempting,
    RetryScheduled,
    Delivered,
    DeadLettered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryError {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// HTTP POST to the agent's endpoint
    Webhook,
    /// In-process message channel
    Message,
    /// Push over a live stream connection (best-effort, not retried)
    Stream,
}

/// A consumption target. Routes and subscriptions name agents by id; this
/// record holds how to actually reach one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub agent_id: String,
    pub method: DeliveryMethod,
    /// Required for webhook delivery
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_stream_connections")]
    pub max_stream_connections: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_max_stream_connections() -> usize {
    4
}

impl AgentEndpoint {
    pub fn webhook(agent_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            method: DeliveryMethod::Webhook,
            endpoint: Some(endpoint.into()),
            max_stream_connections: default_max_stream_connections(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One unit of deliverable work: an event bound to a single target agent.
///
/// Created when a route or subscription resolves a target; destroyed on
/// terminal delivery or dead-letter. The delivery queue is the sole owner
/// of the attempt counters and of the wrapped event's retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryableEvent {
    pub id: Uuid,
    pub event: EventData,
    pub target_agent: String,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub errors: Vec<DeliveryError>,
    /// Set when the work item came from a subscription; drives the
    /// delivery/error counters on that subscription
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    /// Delivery override declared by a subscription; when absent the agent
    /// directory entry is used
    #[serde(default)]
    pub endpoint: Option<AgentEndpoint>,
    pub created_at: DateTime<Utc>,
}

impl RetryableEvent {
    pub fn new(mut event: EventData, target_agent: impl Into<String>, retry_policy: RetryPolicy) -> Self {
        // The wrapped event's retry budget mirrors the policy: N attempts
        // allow N-1 retries.
        event.retry_count = 0;
        event.max_retries = retry_policy.max_attempts.saturating_sub(1);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event,
            target_agent: target_agent.into(),
            attempts: 0,
            next_retry_at: now,
            status: DeliveryStatus::Pending,
            retry_policy,
            errors: Vec::new(),
            subscription_id: None,
            endpoint: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventSource;
    use serde_json::json;

    #[test]
    fn test_new_retryable_event_is_pending() {
        let event = EventData::new(EventSource::Stripe, "invoice.paid", json!({}));
        let item = RetryableEvent::new(event, "billing", RetryPolicy::default());

        assert_eq!(item.status, DeliveryStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.event.retry_count, 0);
        assert_eq!(item.event.max_retries, 2);
        assert!(item.errors.is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::delivery::DeliveryMethod;
use super::filter::{EventFilter, default_enabled};
use super::route::RetryPolicy;

/// Agent-declared interest in events, independent of administrator-defined
/// routes.
///
/// The subscription matches when *any* of its filters matches (OR
/// semantics); within one filter all conditions must hold. The delivery
/// and error counters are mutated only by the subscription registry,
/// exactly once per delivery attempt outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscription {
    pub id: Uuid,
    pub agent_id: String,
    pub filters: Vec<EventFilter>,
    pub method: DeliveryMethod,
    /// Required for webhook delivery
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub delivery_count: u64,
    #[serde(default)]
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventSubscription {
    pub fn new(agent_id: impl Into<String>, filters: Vec<EventFilter>, method: DeliveryMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            filters,
            method,
            endpoint: None,
            retry_policy: RetryPolicy::default(),
            enabled: true,
            delivery_count: 0,
            error_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

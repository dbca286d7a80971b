use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filter::default_enabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base_delay` on every retry
    Fixed,
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^attempt`, capped at `max_delay`
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the computed delay used as the jitter bound; 0 disables
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformationKind {
    /// Rewrite payload fields from dot-paths
    Map,
    /// Narrow the payload to listed fields
    Filter,
    /// Add derived and configured fields
    Enrich,
    /// Fan one event into one derived event per element of an array field
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTransformation {
    pub kind: TransformationKind,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Rule binding filters to target agents. Configuration entity: the router
/// only reads it.
///
/// An empty `source_filters` list is an explicit catch-all: the route
/// matches every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRoute {
    pub id: Uuid,
    pub name: String,
    /// Referenced `EventFilter` ids; empty means catch-all
    #[serde(default)]
    pub source_filters: Vec<Uuid>,
    pub target_agents: Vec<String>,
    #[serde(default)]
    pub transformation: Option<EventTransformation>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Evaluation order; lower runs first. All matching routes apply.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRoute {
    pub fn new(name: impl Into<String>, target_agents: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_filters: Vec::new(),
            target_agents,
            transformation: None,
            retry_policy: RetryPolicy::default(),
            priority: 0,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_route_is_catch_all() {
        let route = EventRoute::new("everything", vec!["auditor".to_string()]);
        assert!(route.source_filters.is_empty());
        assert!(route.enabled);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert!(policy.max_delay_ms >= policy.base_delay_ms);
    }
}

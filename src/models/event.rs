use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known event origins. Each source has its own ingestion endpoint and
/// signing secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Github,
    Stripe,
    Slack,
    Custom,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Github => "github",
            EventSource::Stripe => "stripe",
            EventSource::Slack => "slack",
            EventSource::Custom => "custom",
        }
    }

    /// Parse a source from its URL path segment
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(EventSource::Github),
            "stripe" => Some(EventSource::Stripe),
            "slack" => Some(EventSource::Slack),
            "custom" => Some(EventSource::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Canonical event produced by the validator at ingestion.
///
/// Immutable after creation except for the retry bookkeeping fields
/// (`retry_count`/`max_retries`), which are owned by the delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// Globally unique event id, assigned at ingestion
    pub id: Uuid,

    pub source: EventSource,

    /// Semantic type, e.g. "issues.opened" or "invoice.paid"
    #[serde(rename = "type")]
    pub event_type: String,

    /// Receipt timestamp
    pub timestamp: DateTime<Utc>,

    /// Raw event payload (JSON object)
    pub payload: serde_json::Value,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub priority: EventPriority,

    /// Number of delivery retries performed so far
    pub retry_count: u32,

    /// Retry budget; `retry_count` never exceeds this
    pub max_retries: u32,

    /// Caller-supplied id linking related events across sources
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Set on events derived by a `split` transformation
    #[serde(default)]
    pub parent_event_id: Option<Uuid>,
}

impl EventData {
    /// Create a canonical event with a fresh id and receipt timestamp
    pub fn new(source: EventSource, event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
            tags: Vec::new(),
            priority: EventPriority::default(),
            retry_count: 0,
            max_retries: 0,
            correlation_id: None,
            parent_event_id: None,
        }
    }

    /// Derive a child event with a new payload, preserving lineage.
    ///
    /// Used by the `split` transformation: the child gets a fresh id,
    /// `parent_event_id` pointing at this event, and inherits the
    /// correlation id.
    pub fn derive(&self, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: self.source,
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
            payload,
            tags: self.tags.clone(),
            priority: self.priority,
            retry_count: 0,
            max_retries: self.max_retries,
            correlation_id: self.correlation_id.clone(),
            parent_event_id: Some(self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_round_trip() {
        for s in ["github", "stripe", "slack", "custom"] {
            assert_eq!(EventSource::parse(s).unwrap().as_str(), s);
        }
        assert!(EventSource::parse("gitlab").is_none());
    }

    #[test]
    fn test_derive_preserves_lineage() {
        let mut event = EventData::new(EventSource::Github, "push", json!({"items": [1, 2]}));
        event.correlation_id = Some("corr-1".to_string());

        let child = event.derive(json!({"item": 1}));

        assert_ne!(child.id, event.id);
        assert_eq!(child.parent_event_id, Some(event.id));
        assert_eq!(child.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(child.retry_count, 0);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Critical > EventPriority::High);
        assert!(EventPriority::High > EventPriority::Normal);
        assert!(EventPriority::Normal > EventPriority::Low);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{EventData, EventPriority, EventSource};

/// Message pushed over a live stream connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Event notification
    Event {
        id: Uuid,
        source: EventSource,
        event_type: String,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
        tags: Vec<String>,
        priority: EventPriority,
        correlation_id: Option<String>,
    },

    /// Subscription acknowledged
    Subscribed {
        agent_id: String,
        patterns: Option<Vec<String>>,
    },

    /// Periodic liveness probe; a connection idle past the inactivity
    /// timeout is closed
    Heartbeat { at: DateTime<Utc> },

    /// Error message
    Error { message: String },
}

impl StreamMessage {
    pub fn event(event: &EventData) -> Self {
        StreamMessage::Event {
            id: event.id,
            source: event.source,
            event_type: event.event_type.clone(),
            timestamp: event.timestamp,
            payload: event.payload.clone(),
            tags: event.tags.clone(),
            priority: event.priority,
            correlation_id: event.correlation_id.clone(),
        }
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{EventData, EventSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Received,
    Filtered,
    Processed,
    Delivered,
    Failed,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Received => "received",
            MetricStatus::Filtered => "filtered",
            MetricStatus::Processed => "processed",
            MetricStatus::Delivered => "delivered",
            MetricStatus::Failed => "failed",
        }
    }
}

/// Append-only record of one lifecycle transition for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetric {
    pub event_id: Uuid,
    pub source: EventSource,
    pub event_type: String,
    /// Target agent, for delivery-stage transitions
    #[serde(default)]
    pub agent_id: Option<String>,
    pub status: MetricStatus,
    pub at: DateTime<Utc>,
}

impl EventMetric {
    pub fn of(event: &EventData, status: MetricStatus, agent_id: Option<String>) -> Self {
        Self {
            event_id: event.id,
            source: event.source,
            event_type: event.event_type.clone(),
            agent_id,
            status,
            at: Utc::now(),
        }
    }
}

/// Aggregate view over a time range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsData {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: u64,
    pub by_source: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub by_agent: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
}

//! Append-only lifecycle metrics and time-range aggregation.
//!
//! Every pipeline stage appends one record per transition; the read path
//! folds a requested range into totals and breakdowns. An event that
//! failed validation before an id was assigned records nothing.
//!
//! Retention is bounded: once the in-process store is full, each new
//! record evicts the oldest one, so a long-running deployment holds a
//! sliding window of recent history rather than everything since start.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{AnalyticsData, EventMetric};

const DEFAULT_CAPACITY: usize = 100_000;

pub struct MetricsAggregator {
    capacity: usize,
    records: RwLock<VecDeque<EventMetric>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many records are retained in process
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, metric: EventMetric) {
        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(metric);
    }

    pub async fn aggregate(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> AnalyticsData {
        let records = self.records.read().await;

        let mut total = 0u64;
        let mut by_source: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_agent: HashMap<String, u64> = HashMap::new();
        let mut by_status: HashMap<String, u64> = HashMap::new();

        for metric in records.iter().filter(|m| m.at >= from && m.at <= to) {
            total += 1;
            *by_source.entry(metric.source.as_str().to_string()).or_default() += 1;
            *by_type.entry(metric.event_type.clone()).or_default() += 1;
            *by_status.entry(metric.status.as_str().to_string()).or_default() += 1;
            if let Some(agent) = &metric.agent_id {
                *by_agent.entry(agent.clone()).or_default() += 1;
            }
        }

        AnalyticsData {
            from,
            to,
            total,
            by_source,
            by_type,
            by_agent,
            by_status,
        }
    }

    /// Count of records with a given status, for tests and health probes
    pub async fn count_status(&self, status: crate::models::MetricStatus) -> u64 {
        let records = self.records.read().await;
        records.iter().filter(|m| m.status == status).count() as u64
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

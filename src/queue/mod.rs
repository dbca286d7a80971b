//! Durable per-agent delivery queue with backoff retry.
//!
//! Every target agent gets one worker task fed by an mpsc channel, so all
//! delivery attempts for one agent are serialized through a single owner —
//! per-partition FIFO-with-retry, no locks shared across partitions. Work
//! items persist their `next_retry_at` to the key-value store before every
//! wait, so `recover()` can resume scheduled retries after a restart.

pub mod backoff;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::MetricsAggregator;
use crate::models::{DeliveryError, DeliveryStatus, EventMetric, MetricStatus, RetryableEvent};
use crate::storage::{ConfigStore, ObjectStore};
use crate::subscription::SubscriptionRegistry;
use crate::transport::DeliveryTransport;

const WORKER_CHANNEL_CAPACITY: usize = 1024;

struct QueueInner {
    config: ConfigStore,
    archive: Arc<dyn ObjectStore>,
    transport: Arc<dyn DeliveryTransport>,
    metrics: Arc<MetricsAggregator>,
    subscriptions: SubscriptionRegistry,
    workers: RwLock<HashMap<String, mpsc::Sender<RetryableEvent>>>,
    attempt_timeout: Duration,
}

#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

fn queue_key(item: &RetryableEvent) -> String {
    format!("queue/{}/{}", item.target_agent, item.id)
}

fn archive_key(item: &RetryableEvent) -> String {
    format!("archive/{}/{}", item.event.id, item.target_agent)
}

fn dead_letter_key(event_id: Uuid, target_agent: &str) -> String {
    format!("deadletter/{event_id}/{target_agent}")
}

impl DeliveryQueue {
    pub fn new(
        config: ConfigStore,
        archive: Arc<dyn ObjectStore>,
        transport: Arc<dyn DeliveryTransport>,
        metrics: Arc<MetricsAggregator>,
        subscriptions: SubscriptionRegistry,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                archive,
                transport,
                metrics,
                subscriptions,
                workers: RwLock::new(HashMap::new()),
                attempt_timeout,
            }),
        }
    }

    /// Persist and hand a work item to its partition worker
    pub async fn enqueue(&self, item: RetryableEvent) -> Result<()> {
        persist(&self.inner, &item).await?;
        self.dispatch(item).await
    }

    /// Re-enqueue persisted work after a restart. Returns the number of
    /// resumed items.
    pub async fn recover(&self) -> Result<usize> {
        let entries = self.inner.config.kv().scan_prefix("queue/").await?;
        let mut resumed = 0;
        for (key, value) in entries {
            match serde_json::from_value::<RetryableEvent>(value) {
                Ok(item) => {
                    self.dispatch(item).await?;
                    resumed += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable queue entry"),
            }
        }
        if resumed > 0 {
            info!(resumed, "recovered queued deliveries");
        }
        Ok(resumed)
    }

    /// Re-enqueue a dead-lettered event for one target with a fresh attempt
    /// budget. Returns the new work item id when the dead-letter exists.
    pub async fn replay_dead_letter(&self, event_id: Uuid, target_agent: &str) -> Result<Option<Uuid>> {
        let key = dead_letter_key(event_id, target_agent);
        let Some(value) = self.inner.archive.get(&key).await? else {
            return Ok(None);
        };
        let dead: RetryableEvent =
            serde_json::from_value(value).map_err(|e| anyhow!("undecodable dead-letter {key}: {e}"))?;

        let replay = RetryableEvent {
            subscription_id: dead.subscription_id,
            endpoint: dead.endpoint.clone(),
            ..RetryableEvent::new(dead.event, dead.target_agent, dead.retry_policy)
        };
        let id = replay.id;
        info!(event_id = %event_id, target_agent, "replaying dead-lettered event");
        self.enqueue(replay).await?;
        Ok(Some(id))
    }

    async fn dispatch(&self, item: RetryableEvent) -> Result<()> {
        let sender = self.worker_sender(&item.target_agent).await;
        sender
            .send(item)
            .await
            .map_err(|_| anyhow!("delivery worker channel closed"))
    }

    async fn worker_sender(&self, agent: &str) -> mpsc::Sender<RetryableEvent> {
        {
            let workers = self.inner.workers.read().await;
            if let Some(sender) = workers.get(agent) {
                return sender.clone();
            }
        }

        let mut workers = self.inner.workers.write().await;
        if let Some(sender) = workers.get(agent) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
        workers.insert(agent.to_string(), tx.clone());

        let inner = self.inner.clone();
        let agent = agent.to_string();
        tokio::spawn(async move {
            run_worker(inner, agent, rx).await;
        });

        tx
    }
}

async fn run_worker(inner: Arc<QueueInner>, agent: String, mut rx: mpsc::Receiver<RetryableEvent>) {
    debug!(agent = %agent, "delivery worker started");
    while let Some(mut item) = rx.recv().await {
        deliver_until_terminal(&inner, &mut item).await;
    }
    debug!(agent = %agent, "delivery worker stopped");
}

/// Drive one work item through its state machine until `delivered` or
/// `dead_lettered`.
async fn deliver_until_terminal(inner: &QueueInner, item: &mut RetryableEvent) {
    let key = queue_key(item);

    loop {
        // Logical wake-up: the schedule lives in `next_retry_at`, not in a
        // timer tied to process lifetime
        let now = Utc::now();
        if item.next_retry_at > now {
            if let Ok(wait) = (item.next_retry_at - now).to_std() {
                tokio::time::sleep(wait).await;
            }
        }

        item.status = DeliveryStatus::Attempting;
        item.attempts += 1;
        item.event.retry_count = item.attempts.saturating_sub(1);
        if let Err(e) = persist(inner, item).await {
            warn!(item_id = %item.id, error = %e, "failed to persist attempt state");
        }

        let outcome = attempt_delivery(inner, item).await;

        if let Some(subscription_id) = item.subscription_id {
            if let Err(e) = inner
                .subscriptions
                .record_outcome(subscription_id, outcome.is_ok())
                .await
            {
                warn!(subscription_id = %subscription_id, error = %e, "failed to record subscription outcome");
            }
        }

        match outcome {
            Ok(()) => {
                item.status = DeliveryStatus::Delivered;
                inner
                    .metrics
                    .record(EventMetric::of(
                        &item.event,
                        MetricStatus::Delivered,
                        Some(item.target_agent.clone()),
                    ))
                    .await;

                if let Err(e) = finalize(inner, item, &key, archive_key(item)).await {
                    error!(item_id = %item.id, error = %e, "failed to archive delivered event");
                }
                info!(
                    event_id = %item.event.id,
                    target_agent = %item.target_agent,
                    attempts = item.attempts,
                    "event delivered"
                );
                return;
            }
            Err(e) => {
                item.errors.push(DeliveryError {
                    attempt: item.attempts,
                    at: Utc::now(),
                    message: e.to_string(),
                });

                if item.attempts >= item.retry_policy.max_attempts {
                    item.status = DeliveryStatus::DeadLettered;
                    inner
                        .metrics
                        .record(EventMetric::of(
                            &item.event,
                            MetricStatus::Failed,
                            Some(item.target_agent.clone()),
                        ))
                        .await;

                    let dl_key = dead_letter_key(item.event.id, &item.target_agent);
                    if let Err(e) = finalize(inner, item, &key, dl_key).await {
                        error!(item_id = %item.id, error = %e, "failed to write dead-letter");
                    }
                    warn!(
                        event_id = %item.event.id,
                        target_agent = %item.target_agent,
                        attempts = item.attempts,
                        "delivery exhausted, dead-lettered"
                    );
                    return;
                }

                let delay = backoff::with_jitter(
                    backoff::base_delay(&item.retry_policy, item.attempts),
                    item.retry_policy.jitter,
                );
                item.next_retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                item.status = DeliveryStatus::RetryScheduled;

                debug!(
                    event_id = %item.event.id,
                    target_agent = %item.target_agent,
                    attempt = item.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "delivery failed, retry scheduled"
                );

                if let Err(e) = persist(inner, item).await {
                    warn!(item_id = %item.id, error = %e, "failed to persist retry schedule");
                }
            }
        }
    }
}

/// One bounded delivery attempt against the resolved endpoint
async fn attempt_delivery(inner: &QueueInner, item: &RetryableEvent) -> Result<()> {
    let endpoint = match &item.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => inner
            .config
            .get_agent(&item.target_agent)
            .await?
            .ok_or_else(|| anyhow!("agent '{}' is not registered", item.target_agent))?,
    };

    tokio::time::timeout(inner.attempt_timeout, inner.transport.deliver(&endpoint, &item.event))
        .await
        .map_err(|_| {
            anyhow!(
                "delivery attempt timed out after {}ms",
                inner.attempt_timeout.as_millis()
            )
        })?
}

/// Exactly one archive write per terminal outcome, then the queue entry is
/// removed so no further work item references this event for this target.
async fn finalize(inner: &QueueInner, item: &RetryableEvent, queue_key: &str, archive_key: String) -> Result<()> {
    inner.archive.put(&archive_key, serde_json::to_value(&*item)?).await?;
    inner.config.kv().delete(queue_key).await?;
    Ok(())
}

async fn persist(inner: &QueueInner, item: &RetryableEvent) -> Result<()> {
    inner
        .config
        .kv()
        .put(&queue_key(item), serde_json::to_value(item)?, None)
        .await
}

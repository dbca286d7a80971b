//! Ingestion pipeline: validate, admit, resolve, hand off.
//!
//! One inbound request flows through here exactly once. Stage order is
//! fixed: authentication before admission control, admission control
//! before any routing work, so a hostile or overloaded source never costs
//! a route evaluation. Everything after resolution is asynchronous; the
//! caller gets an accepted/filtered answer, not a delivery outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::HookbusError;
use crate::metrics::MetricsAggregator;
use crate::models::{
    AgentEndpoint, DeliveryMethod, EventData, EventMetric, EventSource, EventSubscription,
    MetricStatus, RetryableEvent,
};
use crate::queue::DeliveryQueue;
use crate::ratelimit::RateLimiter;
use crate::router::{EventRouter, ResolvedDelivery};
use crate::storage::ConfigStore;
use crate::stream::StreamDispatcher;
use crate::subscription::SubscriptionRegistry;
use crate::validator::{IngestHeaders, Validator};

/// What the ingestion endpoint reports back to the sender
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub event_id: Uuid,
    /// Work items queued via routes
    pub routed: usize,
    /// Work items queued via subscriptions
    pub subscribed: usize,
    /// Live stream pushes that reached at least one connection
    /// (best-effort, already done)
    pub streamed: usize,
}

pub struct EventPipeline {
    validator: Validator,
    limiter: Arc<RateLimiter>,
    router: EventRouter,
    subscriptions: SubscriptionRegistry,
    queue: DeliveryQueue,
    stream: Arc<StreamDispatcher>,
    metrics: Arc<MetricsAggregator>,
    directory: ConfigStore,
}

impl EventPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        validator: Validator,
        limiter: Arc<RateLimiter>,
        router: EventRouter,
        subscriptions: SubscriptionRegistry,
        queue: DeliveryQueue,
        stream: Arc<StreamDispatcher>,
        metrics: Arc<MetricsAggregator>,
        directory: ConfigStore,
    ) -> Self {
        Self {
            validator,
            limiter,
            router,
            subscriptions,
            queue,
            stream,
            metrics,
            directory,
        }
    }

    /// Process one raw inbound event end to end.
    ///
    /// A rejected event (bad signature, rate limited) records nothing past
    /// the point of rejection and is never retried on this path.
    pub async fn ingest(
        &self,
        source: EventSource,
        headers: &IngestHeaders,
        body: &[u8],
    ) -> Result<IngestOutcome, HookbusError> {
        let event = self.validator.validate(source, headers, body)?;
        self.metrics
            .record(EventMetric::of(&event, MetricStatus::Received, None))
            .await;

        let identifier = headers.identifier.as_deref().unwrap_or("global");
        self.limiter.check(source, identifier).await?;

        let deliveries = self
            .router
            .resolve(&event)
            .await
            .map_err(|e| HookbusError::Processing(e.to_string()))?;
        let subscriptions = self
            .subscriptions
            .matching(&event)
            .await
            .map_err(|e| HookbusError::Processing(e.to_string()))?;

        if deliveries.is_empty() && subscriptions.is_empty() {
            debug!(event_id = %event.id, event_type = %event.event_type, "no route or subscription matched");
            self.metrics
                .record(EventMetric::of(&event, MetricStatus::Filtered, None))
                .await;
            return Ok(IngestOutcome {
                event_id: event.id,
                routed: 0,
                subscribed: 0,
                streamed: 0,
            });
        }

        self.metrics
            .record(EventMetric::of(&event, MetricStatus::Processed, None))
            .await;

        let mut outcome = IngestOutcome {
            event_id: event.id,
            routed: 0,
            subscribed: 0,
            streamed: 0,
        };

        for delivery in deliveries {
            self.dispatch_routed(delivery, &mut outcome).await?;
        }
        for sub in subscriptions {
            self.dispatch_subscribed(&event, sub, &mut outcome).await?;
        }

        info!(
            event_id = %event.id,
            source = %source,
            routed = outcome.routed,
            subscribed = outcome.subscribed,
            streamed = outcome.streamed,
            "event accepted"
        );
        Ok(outcome)
    }

    /// A routed target whose directory entry declares stream delivery is
    /// pushed directly; everything else goes through the durable queue.
    async fn dispatch_routed(
        &self,
        delivery: ResolvedDelivery,
        outcome: &mut IngestOutcome,
    ) -> Result<(), HookbusError> {
        let endpoint = self
            .directory
            .get_agent(&delivery.target_agent)
            .await
            .map_err(|e| HookbusError::Storage(e.to_string()))?;

        if matches!(endpoint, Some(AgentEndpoint { method: DeliveryMethod::Stream, .. })) {
            self.push_stream(&delivery.target_agent, &delivery.event, outcome).await;
            return Ok(());
        }

        self.queue
            .enqueue(RetryableEvent::new(
                delivery.event,
                delivery.target_agent,
                delivery.retry_policy,
            ))
            .await
            .map_err(|e| HookbusError::Processing(e.to_string()))?;
        outcome.routed += 1;
        Ok(())
    }

    async fn dispatch_subscribed(
        &self,
        event: &EventData,
        sub: EventSubscription,
        outcome: &mut IngestOutcome,
    ) -> Result<(), HookbusError> {
        if sub.method == DeliveryMethod::Stream {
            self.push_stream(&sub.agent_id, event, outcome).await;
            return Ok(());
        }

        // The subscription declares its own delivery method and endpoint,
        // overriding whatever the agent directory says
        let now = chrono::Utc::now();
        let endpoint = AgentEndpoint {
            agent_id: sub.agent_id.clone(),
            method: sub.method,
            endpoint: sub.endpoint.clone(),
            max_stream_connections: 0,
            created_at: now,
            updated_at: now,
        };
        let item = RetryableEvent {
            subscription_id: Some(sub.id),
            endpoint: Some(endpoint),
            ..RetryableEvent::new(event.clone(), sub.agent_id, sub.retry_policy)
        };
        self.queue
            .enqueue(item)
            .await
            .map_err(|e| HookbusError::Processing(e.to_string()))?;
        outcome.subscribed += 1;
        Ok(())
    }

    async fn push_stream(&self, agent_id: &str, event: &EventData, outcome: &mut IngestOutcome) {
        let reached = self.stream.publish(agent_id, event).await;
        if reached == 0 {
            debug!(agent_id, event_id = %event.id, "stream push reached no connections");
            return;
        }
        outcome.streamed += 1;
        self.metrics
            .record(EventMetric::of(
                event,
                MetricStatus::Delivered,
                Some(agent_id.to_string()),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventRoute, RateLimitConfig, RetryPolicy};
    use crate::storage::{MemoryKeyValueStore, MemoryObjectStore};
    use crate::transport::MessageTransport;
    use crate::validator::sign;
    use std::collections::HashMap;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn signed(body: &[u8]) -> IngestHeaders {
        IngestHeaders {
            signature: Some(sign(SECRET, body)),
            event_type: Some("push".to_string()),
            ..Default::default()
        }
    }

    async fn pipeline_with(
        limit: RateLimitConfig,
    ) -> (EventPipeline, Arc<MessageTransport>, ConfigStore, Arc<StreamDispatcher>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let config = ConfigStore::new(kv.clone());
        let metrics = Arc::new(MetricsAggregator::new());
        let stream = Arc::new(StreamDispatcher::new(4));
        let subscriptions = SubscriptionRegistry::new(kv.clone());
        let message = Arc::new(MessageTransport::new());

        let queue = DeliveryQueue::new(
            config.clone(),
            Arc::new(MemoryObjectStore::new()),
            message.clone(),
            metrics.clone(),
            subscriptions.clone(),
            Duration::from_secs(1),
        );

        let mut secrets = HashMap::new();
        secrets.insert(EventSource::Github, SECRET.to_string());

        let pipeline = EventPipeline::new(
            Validator::new(secrets),
            Arc::new(RateLimiter::new(limit, kv.clone())),
            EventRouter::new(config.clone()),
            subscriptions,
            queue,
            stream.clone(),
            metrics,
            config.clone(),
        );
        (pipeline, message, config, stream)
    }

    #[tokio::test]
    async fn test_unmatched_event_is_filtered() {
        let (pipeline, _message, _config, _stream) = pipeline_with(RateLimitConfig::default()).await;
        let body = br#"{"action": "opened"}"#;

        let outcome = pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap();

        assert_eq!(outcome.routed, 0);
        assert_eq!(outcome.subscribed, 0);
        assert_eq!(outcome.streamed, 0);
    }

    #[tokio::test]
    async fn test_catch_all_route_delivers_to_consumer() {
        let (pipeline, message, config, _stream) = pipeline_with(RateLimitConfig::default()).await;
        let mut rx = message.register("worker").await;

        config
            .put_agent(&crate::models::AgentEndpoint {
                agent_id: "worker".to_string(),
                method: DeliveryMethod::Message,
                endpoint: None,
                max_stream_connections: 4,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let mut route = EventRoute::new("all", vec!["worker".to_string()]);
        route.retry_policy = RetryPolicy {
            base_delay_ms: 1,
            ..RetryPolicy::default()
        };
        config.put_route(&route).await.unwrap();

        let body = br#"{"action": "opened"}"#;
        let outcome = pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap();
        assert_eq!(outcome.routed, 1);

        let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.id, outcome.event_id);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_budget() {
        let limit = RateLimitConfig {
            limit: 1,
            window_secs: 60,
            burst: 0,
        };
        let (pipeline, _message, _config, _stream) = pipeline_with(limit).await;
        let body = br#"{"a": 1}"#;

        pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap();
        let err = pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap_err();
        assert!(matches!(err, HookbusError::RateLimited(_)));
    }

    async fn register_stream_viewer(config: &ConfigStore) {
        config
            .put_agent(&crate::models::AgentEndpoint {
                agent_id: "viewer".to_string(),
                method: DeliveryMethod::Stream,
                endpoint: None,
                max_stream_connections: 4,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        config
            .put_route(&EventRoute::new("live", vec!["viewer".to_string()]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_target_is_pushed_not_queued() {
        let (pipeline, _message, config, stream) = pipeline_with(RateLimitConfig::default()).await;
        register_stream_viewer(&config).await;
        let _rx = stream.subscribe("viewer", None).await.unwrap();

        let body = br#"{"a": 1}"#;
        let outcome = pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap();

        assert_eq!(outcome.routed, 0);
        assert_eq!(outcome.streamed, 1);
    }

    #[tokio::test]
    async fn test_stream_push_without_listener_counts_nothing() {
        let (pipeline, _message, config, _stream) = pipeline_with(RateLimitConfig::default()).await;
        register_stream_viewer(&config).await;

        let body = br#"{"a": 1}"#;
        let outcome = pipeline
            .ingest(EventSource::Github, &signed(body), body)
            .await
            .unwrap();

        // No open connection: the push reached nobody and is not reported
        assert_eq!(outcome.streamed, 0);
        assert_eq!(outcome.routed, 0);
    }
}

//! End-to-end pipeline tests against in-memory storage.
//!
//! These wire the full stack the way `main` does, minus the HTTP layer:
//! signed ingestion, filter/route resolution, subscription matching,
//! queued delivery through the message transport, and stream push.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use hookbus::metrics::MetricsAggregator;
use hookbus::models::{
    AgentEndpoint, DeliveryMethod, EventFilter, EventRoute, EventSource, EventSubscription,
    FilterAction, FilterCondition, FilterOperator, MetricStatus, RateLimitConfig, RetryPolicy,
    StreamMessage,
};
use hookbus::pipeline::EventPipeline;
use hookbus::queue::DeliveryQueue;
use hookbus::ratelimit::RateLimiter;
use hookbus::router::EventRouter;
use hookbus::storage::{ConfigStore, MemoryKeyValueStore, MemoryObjectStore};
use hookbus::stream::StreamDispatcher;
use hookbus::subscription::SubscriptionRegistry;
use hookbus::transport::{AgentTransport, MessageTransport};
use hookbus::validator::{IngestHeaders, Validator, sign};
use hookbus::HookbusError;

const SECRET: &str = "integration-secret";

struct Harness {
    pipeline: EventPipeline,
    configs: ConfigStore,
    subscriptions: SubscriptionRegistry,
    message: Arc<MessageTransport>,
    dispatcher: Arc<StreamDispatcher>,
    metrics: Arc<MetricsAggregator>,
}

fn harness() -> Harness {
    harness_with(RateLimitConfig::default())
}

fn harness_with(rate_limit: RateLimitConfig) -> Harness {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let configs = ConfigStore::new(kv.clone());
    let subscriptions = SubscriptionRegistry::new(kv.clone());
    let metrics = Arc::new(MetricsAggregator::new());
    let dispatcher = Arc::new(StreamDispatcher::new(4));
    let message = Arc::new(MessageTransport::new());
    let transport = Arc::new(AgentTransport::new(message.clone(), dispatcher.clone()));

    let queue = DeliveryQueue::new(
        configs.clone(),
        Arc::new(MemoryObjectStore::new()),
        transport,
        metrics.clone(),
        subscriptions.clone(),
        Duration::from_secs(2),
    );

    let mut secrets = HashMap::new();
    secrets.insert(EventSource::Github, SECRET.to_string());
    secrets.insert(EventSource::Stripe, SECRET.to_string());

    let pipeline = EventPipeline::new(
        Validator::new(secrets),
        Arc::new(RateLimiter::new(rate_limit, kv.clone())),
        EventRouter::new(configs.clone()),
        subscriptions.clone(),
        queue,
        dispatcher.clone(),
        metrics.clone(),
        configs.clone(),
    );

    Harness {
        pipeline,
        configs,
        subscriptions,
        message,
        dispatcher,
        metrics,
    }
}

fn signed_headers(body: &[u8], event_type: &str) -> IngestHeaders {
    IngestHeaders {
        signature: Some(sign(SECRET, body)),
        event_type: Some(event_type.to_string()),
        correlation_id: None,
        identifier: None,
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 10,
        ..RetryPolicy::default()
    }
}

fn condition(field: &str, value: serde_json::Value) -> FilterCondition {
    FilterCondition {
        field: field.to_string(),
        operator: FilterOperator::Equals,
        value,
        case_insensitive: false,
    }
}

async fn register_message_agent(h: &Harness, agent_id: &str) -> tokio::sync::mpsc::Receiver<hookbus::models::EventData> {
    let rx = h.message.register(agent_id).await;
    let now = chrono::Utc::now();
    h.configs
        .put_agent(&AgentEndpoint {
            agent_id: agent_id.to_string(),
            method: DeliveryMethod::Message,
            endpoint: None,
            max_stream_connections: 4,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    rx
}

#[tokio::test]
async fn test_filtered_route_delivers_matching_event_only() {
    let h = harness();
    let mut rx = register_message_agent(&h, "issue-worker").await;

    let filter = EventFilter::new(
        "opened-issues",
        vec![condition("action", json!("opened"))],
        FilterAction::Include,
    );
    h.configs.put_filter(&filter).await.unwrap();

    let mut route = EventRoute::new("issues-to-worker", vec!["issue-worker".to_string()]);
    route.source_filters = vec![filter.id];
    route.retry_policy = fast_policy();
    h.configs.put_route(&route).await.unwrap();

    // Matching event is routed and delivered
    let body = br#"{"action": "opened", "number": 42}"#;
    let outcome = h
        .pipeline
        .ingest(EventSource::Github, &signed_headers(body, "issues.opened"), body)
        .await
        .unwrap();
    assert_eq!(outcome.routed, 1);
    assert_eq!(outcome.subscribed, 0);

    let delivered = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.id, outcome.event_id);
    assert_eq!(delivered.payload["number"], 42);

    // Non-matching event is filtered out
    let body = br#"{"action": "closed", "number": 43}"#;
    let outcome = h
        .pipeline
        .ingest(EventSource::Github, &signed_headers(body, "issues.closed"), body)
        .await
        .unwrap();
    assert_eq!(outcome.routed, 0);

    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    assert_eq!(h.metrics.count_status(MetricStatus::Filtered).await, 1);
}

#[tokio::test]
async fn test_subscription_delivery_updates_counters() {
    let h = harness();
    let mut rx = register_message_agent(&h, "auditor").await;

    let interest = EventFilter::new(
        "paid-invoices",
        vec![condition("status", json!("paid"))],
        FilterAction::Include,
    );
    let mut sub = EventSubscription::new("auditor", vec![interest], DeliveryMethod::Message);
    sub.retry_policy = fast_policy();
    h.subscriptions.put(&sub).await.unwrap();

    let body = br#"{"status": "paid", "amount": 1200}"#;
    let outcome = h
        .pipeline
        .ingest(EventSource::Stripe, &signed_headers(body, "invoice.paid"), body)
        .await
        .unwrap();
    assert_eq!(outcome.subscribed, 1);
    assert_eq!(outcome.routed, 0);

    let delivered = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.id, outcome.event_id);

    // Counter update is written by the delivery worker after the attempt
    let mut count = 0;
    for _ in 0..100 {
        count = h.subscriptions.get(sub.id).await.unwrap().unwrap().delivery_count;
        if count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_route_and_subscription_fan_out_independently() {
    let h = harness();
    let mut route_rx = register_message_agent(&h, "worker").await;
    let mut sub_rx = register_message_agent(&h, "mirror").await;

    let mut route = EventRoute::new("everything", vec!["worker".to_string()]);
    route.retry_policy = fast_policy();
    h.configs.put_route(&route).await.unwrap();

    let mut sub = EventSubscription::new("mirror", vec![], DeliveryMethod::Message);
    sub.retry_policy = fast_policy();
    h.subscriptions.put(&sub).await.unwrap();

    let body = br#"{"text": "hello"}"#;
    let outcome = h
        .pipeline
        .ingest(EventSource::Slack, &signed_headers(body, "message"), body)
        .await
        .unwrap_err();
    // Slack has no secret in this harness
    assert!(matches!(outcome, HookbusError::Unauthorized(_)));

    let outcome = h
        .pipeline
        .ingest(EventSource::Github, &signed_headers(body, "message"), body)
        .await
        .unwrap();
    assert_eq!(outcome.routed, 1);
    assert_eq!(outcome.subscribed, 1);

    let a = timeout(Duration::from_secs(2), route_rx.recv()).await.unwrap().unwrap();
    let b = timeout(Duration::from_secs(2), sub_rx.recv()).await.unwrap().unwrap();
    assert_eq!(a.id, outcome.event_id);
    assert_eq!(b.id, outcome.event_id);
}

#[tokio::test]
async fn test_stream_agent_receives_push() {
    let h = harness();

    let now = chrono::Utc::now();
    h.configs
        .put_agent(&AgentEndpoint {
            agent_id: "viewer".to_string(),
            method: DeliveryMethod::Stream,
            endpoint: None,
            max_stream_connections: 4,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    h.configs
        .put_route(&EventRoute::new("live-feed", vec!["viewer".to_string()]))
        .await
        .unwrap();

    let mut rx = h.dispatcher.subscribe("viewer", None).await.unwrap();

    let body = br#"{"action": "opened"}"#;
    let outcome = h
        .pipeline
        .ingest(EventSource::Github, &signed_headers(body, "issues.opened"), body)
        .await
        .unwrap();
    assert_eq!(outcome.streamed, 1);
    assert_eq!(outcome.routed, 0);

    match timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap() {
        StreamMessage::Event { id, event_type, .. } => {
            assert_eq!(id, outcome.event_id);
            assert_eq!(event_type, "issues.opened");
        }
        other => panic!("expected event, got {other:?}"),
    }

    // Push was counted as delivered
    assert_eq!(h.metrics.count_status(MetricStatus::Delivered).await, 1);
}

#[tokio::test]
async fn test_rate_limited_source_is_rejected() {
    let h = harness_with(RateLimitConfig {
        limit: 2,
        window_secs: 60,
        burst: 0,
    });

    let body = br#"{"n": 1}"#;
    for _ in 0..2 {
        h.pipeline
            .ingest(EventSource::Github, &signed_headers(body, "push"), body)
            .await
            .unwrap();
    }

    let err = h
        .pipeline
        .ingest(EventSource::Github, &signed_headers(body, "push"), body)
        .await
        .unwrap_err();
    assert!(matches!(err, HookbusError::RateLimited(_)));

    // Another source identifier is unaffected
    let other = IngestHeaders {
        identifier: Some("tenant-b".to_string()),
        ..signed_headers(body, "push")
    };
    h.pipeline.ingest(EventSource::Github, &other, body).await.unwrap();
}

#[tokio::test]
async fn test_tampered_body_is_rejected_before_any_metric() {
    let h = harness();

    let headers = signed_headers(br#"{"a": 1}"#, "push");
    let err = h
        .pipeline
        .ingest(EventSource::Github, &headers, br#"{"a": 2}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, HookbusError::Unauthorized(_)));

    assert_eq!(h.metrics.count_status(MetricStatus::Received).await, 0);
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use hookbus::config::Settings;
use hookbus::metrics::MetricsAggregator;
use hookbus::models::EventSource;
use hookbus::pipeline::EventPipeline;
use hookbus::queue::DeliveryQueue;
use hookbus::ratelimit::RateLimiter;
use hookbus::router::EventRouter;
use hookbus::storage::{
    ConfigStore, KeyValueStore, MemoryKeyValueStore, MemoryObjectStore, ObjectStore, PgStorage,
};
use hookbus::stream::StreamDispatcher;
use hookbus::subscription::SubscriptionRegistry;
use hookbus::transport::{AgentTransport, MessageTransport};
use hookbus::validator::Validator;
use hookbus::{AppState, Metrics, Pipeline, Queue, Streams, app_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Hookbus event router");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let (kv, objects): (Arc<dyn KeyValueStore>, Arc<dyn ObjectStore>) = match &settings.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let storage = PgStorage::connect(url).await?;
            info!("Running database migrations...");
            storage.migrate().await?;
            (Arc::new(storage.key_value()), Arc::new(storage.objects()))
        }
        None => {
            warn!("No database_url configured, state will not survive a restart");
            (Arc::new(MemoryKeyValueStore::new()), Arc::new(MemoryObjectStore::new()))
        }
    };

    let mut secrets = HashMap::new();
    for (name, secret) in &settings.source_secrets {
        match EventSource::parse(name) {
            Some(source) => {
                secrets.insert(source, secret.clone());
            }
            None => warn!(source = %name, "ignoring secret for unknown source"),
        }
    }
    if secrets.is_empty() {
        warn!("No source secrets configured, every ingestion request will be rejected");
    }

    let configs = ConfigStore::new(kv.clone());
    let subscriptions = SubscriptionRegistry::new(kv.clone());
    let metrics = Arc::new(MetricsAggregator::new());
    let dispatcher = Arc::new(StreamDispatcher::new(settings.stream.max_connections_per_agent));
    let message_transport = Arc::new(MessageTransport::new());
    let transport = Arc::new(AgentTransport::new(message_transport, dispatcher.clone()));

    let queue = DeliveryQueue::new(
        configs.clone(),
        objects,
        transport,
        metrics.clone(),
        subscriptions.clone(),
        Duration::from_secs(settings.queue.attempt_timeout_secs),
    );

    let resumed = queue.recover().await?;
    info!(resumed, "delivery queue recovery complete");

    let pipeline = Arc::new(EventPipeline::new(
        Validator::new(secrets),
        Arc::new(RateLimiter::new(settings.rate_limit.clone(), kv.clone())),
        EventRouter::new(configs.clone()),
        subscriptions.clone(),
        queue.clone(),
        dispatcher.clone(),
        metrics.clone(),
        configs.clone(),
    ));

    // Heartbeat and idle-channel sweep for live stream connections
    let heartbeat_dispatcher = dispatcher.clone();
    let heartbeat_interval = Duration::from_secs(settings.stream.heartbeat_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        loop {
            interval.tick().await;
            heartbeat_dispatcher.heartbeat().await;
            heartbeat_dispatcher.cleanup_idle_channels().await;
        }
    });

    let state = AppState {
        settings: settings.clone(),
        configs,
        subscriptions,
        pipeline: Pipeline(pipeline),
        queue: Queue(queue),
        streams: Streams(dispatcher),
        metrics: Metrics(metrics),
    };

    let addr = format!("{}:{}", settings.host, settings.port);
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app_router(state)).await?;

    Ok(())
}

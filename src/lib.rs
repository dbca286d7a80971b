pub mod api;
pub mod auth;
pub mod config;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod ratelimit;
pub mod router;
pub mod storage;
pub mod stream;
pub mod subscription;
pub mod transport;
pub mod validator;

use std::ops::Deref;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::FromRef;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::metrics::MetricsAggregator;
use crate::pipeline::EventPipeline;
use crate::queue::DeliveryQueue;
use crate::storage::ConfigStore;
use crate::stream::StreamDispatcher;
use crate::subscription::SubscriptionRegistry;

// ============================================================================
// State wrappers
// ============================================================================

/// Pipeline wrapper for state extraction
#[derive(Clone)]
pub struct Pipeline(pub Arc<EventPipeline>);

impl Deref for Pipeline {
    type Target = EventPipeline;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Stream dispatcher wrapper for state extraction
#[derive(Clone)]
pub struct Streams(pub Arc<StreamDispatcher>);

impl Deref for Streams {
    type Target = StreamDispatcher;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Metrics aggregator wrapper for state extraction
#[derive(Clone)]
pub struct Metrics(pub Arc<MetricsAggregator>);

impl Deref for Metrics {
    type Target = MetricsAggregator;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Delivery queue wrapper for state extraction
#[derive(Clone)]
pub struct Queue(pub DeliveryQueue);

impl Deref for Queue {
    type Target = DeliveryQueue;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum HookbusError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HookbusError>;

impl HookbusError {
    pub fn to_status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            HookbusError::Validation(_) => StatusCode::BAD_REQUEST,
            HookbusError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HookbusError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            HookbusError::NotFound(_) => StatusCode::NOT_FOUND,
            HookbusError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HookbusError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HookbusError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub configs: ConfigStore,
    pub subscriptions: SubscriptionRegistry,
    pub pipeline: Pipeline,
    pub queue: Queue,
    pub streams: Streams,
    pub metrics: Metrics,
}

impl FromRef<AppState> for Settings {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

impl FromRef<AppState> for ConfigStore {
    fn from_ref(state: &AppState) -> Self {
        state.configs.clone()
    }
}

impl FromRef<AppState> for SubscriptionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.subscriptions.clone()
    }
}

impl FromRef<AppState> for Pipeline {
    fn from_ref(state: &AppState) -> Self {
        state.pipeline.clone()
    }
}

impl FromRef<AppState> for Queue {
    fn from_ref(state: &AppState) -> Self {
        state.queue.clone()
    }
}

impl FromRef<AppState> for Streams {
    fn from_ref(state: &AppState) -> Self {
        state.streams.clone()
    }
}

impl FromRef<AppState> for Metrics {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

// ============================================================================
// Health check handler
// ============================================================================

async fn health_check() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

// ============================================================================
// Router
// ============================================================================

pub fn app_router(state: AppState) -> Router {
    let admin = Router::new()
        // Filter routes
        .route(
            "/api/filters",
            get(api::filters::list_filters).post(api::filters::create_filter),
        )
        .route(
            "/api/filters/:filter_id",
            get(api::filters::get_filter)
                .put(api::filters::update_filter)
                .delete(api::filters::delete_filter),
        )
        // Route routes
        .route(
            "/api/routes",
            get(api::routes::list_routes).post(api::routes::create_route),
        )
        .route(
            "/api/routes/:route_id",
            get(api::routes::get_route)
                .put(api::routes::update_route)
                .delete(api::routes::delete_route),
        )
        // Subscription routes
        .route(
            "/api/subscriptions",
            get(api::subscriptions::list_subscriptions).post(api::subscriptions::create_subscription),
        )
        .route(
            "/api/subscriptions/:subscription_id",
            get(api::subscriptions::get_subscription)
                .put(api::subscriptions::update_subscription)
                .delete(api::subscriptions::delete_subscription),
        )
        // Agent directory routes
        .route(
            "/api/agents",
            get(api::agents::list_agents).post(api::agents::register_agent),
        )
        .route(
            "/api/agents/:agent_id",
            get(api::agents::get_agent).delete(api::agents::delete_agent),
        )
        // Analytics route
        .route("/api/analytics", get(api::analytics::get_analytics))
        // Dead-letter replay
        .route(
            "/api/deadletters/:event_id/:agent_id/replay",
            post(api::deadletters::replay_dead_letter),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.settings.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        // Health check
        .route("/api", get(health_check))
        // Ingestion (authenticated by signature, not by bearer token)
        .route("/ingest/:source", post(api::ingest::ingest_event))
        // Agent stream WebSocket (token in header or query)
        .route("/ws/agents/:agent_id/stream", get(api::stream::ws_agent_stream))
        .merge(admin)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

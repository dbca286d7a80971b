use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::{ApiResponse, PageParams, PaginatedResponse};
use crate::models::{DeliveryMethod, EventFilter, EventSubscription, RetryPolicy};
use crate::subscription::SubscriptionRegistry;

/// GET /api/subscriptions - List subscriptions
pub async fn list_subscriptions(
    State(registry): State<SubscriptionRegistry>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<EventSubscription>>>, ApiError> {
    let subs = registry.list().await?;
    Ok(ApiResponse::ok(PaginatedResponse::paginate(subs, &params)))
}

/// GET /api/subscriptions/:subscription_id - Get subscription by ID
pub async fn get_subscription(
    State(registry): State<SubscriptionRegistry>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EventSubscription>>, ApiError> {
    match registry.get(subscription_id).await? {
        Some(sub) => Ok(ApiResponse::ok(sub)),
        None => Err(ApiError::not_found("subscription not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub agent_id: String,
    #[serde(default)]
    pub filters: Vec<EventFilter>,
    pub method: DeliveryMethod,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

/// POST /api/subscriptions - Create a new subscription
pub async fn create_subscription(
    State(registry): State<SubscriptionRegistry>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<Json<ApiResponse<EventSubscription>>, ApiError> {
    if req.method == DeliveryMethod::Webhook && req.endpoint.is_none() {
        return Err(ApiError::bad_request("webhook subscriptions need an endpoint"));
    }

    let mut sub = EventSubscription::new(req.agent_id, req.filters, req.method);
    sub.endpoint = req.endpoint;
    if let Some(policy) = req.retry_policy {
        sub.retry_policy = policy;
    }

    registry.put(&sub).await?;
    Ok(ApiResponse::ok(sub))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub filters: Option<Vec<EventFilter>>,
    pub method: Option<DeliveryMethod>,
    pub endpoint: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub enabled: Option<bool>,
}

/// PUT /api/subscriptions/:subscription_id - Update subscription
pub async fn update_subscription(
    State(registry): State<SubscriptionRegistry>,
    Path(subscription_id): Path<Uuid>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<Json<ApiResponse<EventSubscription>>, ApiError> {
    let Some(mut sub) = registry.get(subscription_id).await? else {
        return Err(ApiError::not_found("subscription not found"));
    };

    if let Some(filters) = req.filters {
        sub.filters = filters;
    }
    if let Some(method) = req.method {
        sub.method = method;
    }
    if let Some(endpoint) = req.endpoint {
        sub.endpoint = Some(endpoint);
    }
    if let Some(policy) = req.retry_policy {
        sub.retry_policy = policy;
    }
    if let Some(enabled) = req.enabled {
        sub.enabled = enabled;
    }
    if sub.method == DeliveryMethod::Webhook && sub.endpoint.is_none() {
        return Err(ApiError::bad_request("webhook subscriptions need an endpoint"));
    }
    sub.updated_at = chrono::Utc::now();

    registry.put(&sub).await?;
    Ok(ApiResponse::ok(sub))
}

/// DELETE /api/subscriptions/:subscription_id - Delete subscription
pub async fn delete_subscription(
    State(registry): State<SubscriptionRegistry>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !registry.delete(subscription_id).await? {
        return Err(ApiError::not_found("subscription not found"));
    }
    Ok(ApiResponse::ok(serde_json::json!({"deleted": subscription_id})))
}

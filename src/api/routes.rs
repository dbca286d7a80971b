use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::{ApiResponse, PageParams, PaginatedResponse};
use crate::models::{EventRoute, EventTransformation, RetryPolicy};
use crate::storage::ConfigStore;

/// GET /api/routes - List routes
pub async fn list_routes(
    State(configs): State<ConfigStore>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<EventRoute>>>, ApiError> {
    let routes = configs.list_routes().await?;
    Ok(ApiResponse::ok(PaginatedResponse::paginate(routes, &params)))
}

/// GET /api/routes/:route_id - Get route by ID
pub async fn get_route(
    State(configs): State<ConfigStore>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EventRoute>>, ApiError> {
    match configs.get_route(route_id).await? {
        Some(route) => Ok(ApiResponse::ok(route)),
        None => Err(ApiError::not_found("route not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub name: String,
    #[serde(default)]
    pub source_filters: Vec<Uuid>,
    pub target_agents: Vec<String>,
    #[serde(default)]
    pub transformation: Option<EventTransformation>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub priority: i32,
}

/// POST /api/routes - Create a new route
pub async fn create_route(
    State(configs): State<ConfigStore>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<Json<ApiResponse<EventRoute>>, ApiError> {
    if req.target_agents.is_empty() {
        return Err(ApiError::bad_request("route needs at least one target agent"));
    }
    // Every referenced filter must exist at creation time; a dangling
    // reference would silently disable the route later
    for filter_id in &req.source_filters {
        if configs.get_filter(*filter_id).await?.is_none() {
            return Err(ApiError::bad_request(format!("unknown filter {filter_id}")));
        }
    }
    if req.source_filters.is_empty() {
        warn!(route = %req.name, "route has no source filters and will match every event");
    }

    let mut route = EventRoute::new(req.name, req.target_agents);
    route.source_filters = req.source_filters;
    route.transformation = req.transformation;
    route.priority = req.priority;
    if let Some(policy) = req.retry_policy {
        route.retry_policy = policy;
    }

    configs.put_route(&route).await?;
    Ok(ApiResponse::ok(route))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRouteRequest {
    pub name: Option<String>,
    pub source_filters: Option<Vec<Uuid>>,
    pub target_agents: Option<Vec<String>>,
    pub transformation: Option<EventTransformation>,
    pub retry_policy: Option<RetryPolicy>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

/// PUT /api/routes/:route_id - Update route
pub async fn update_route(
    State(configs): State<ConfigStore>,
    Path(route_id): Path<Uuid>,
    Json(req): Json<UpdateRouteRequest>,
) -> Result<Json<ApiResponse<EventRoute>>, ApiError> {
    let Some(mut route) = configs.get_route(route_id).await? else {
        return Err(ApiError::not_found("route not found"));
    };

    if let Some(name) = req.name {
        route.name = name;
    }
    if let Some(source_filters) = req.source_filters {
        for filter_id in &source_filters {
            if configs.get_filter(*filter_id).await?.is_none() {
                return Err(ApiError::bad_request(format!("unknown filter {filter_id}")));
            }
        }
        route.source_filters = source_filters;
    }
    if let Some(target_agents) = req.target_agents {
        if target_agents.is_empty() {
            return Err(ApiError::bad_request("route needs at least one target agent"));
        }
        route.target_agents = target_agents;
    }
    if let Some(transformation) = req.transformation {
        route.transformation = Some(transformation);
    }
    if let Some(policy) = req.retry_policy {
        route.retry_policy = policy;
    }
    if let Some(priority) = req.priority {
        route.priority = priority;
    }
    if let Some(enabled) = req.enabled {
        route.enabled = enabled;
    }
    route.updated_at = chrono::Utc::now();

    configs.put_route(&route).await?;
    Ok(ApiResponse::ok(route))
}

/// DELETE /api/routes/:route_id - Delete route
pub async fn delete_route(
    State(configs): State<ConfigStore>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !configs.delete_route(route_id).await? {
        return Err(ApiError::not_found("route not found"));
    }
    Ok(ApiResponse::ok(serde_json::json!({"deleted": route_id})))
}

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::{ApiResponse, PageParams, PaginatedResponse};
use crate::models::{EventFilter, FilterAction, FilterCondition};
use crate::storage::ConfigStore;

/// GET /api/filters - List filters
pub async fn list_filters(
    State(configs): State<ConfigStore>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<EventFilter>>>, ApiError> {
    let filters = configs.list_filters().await?;
    Ok(ApiResponse::ok(PaginatedResponse::paginate(filters, &params)))
}

/// GET /api/filters/:filter_id - Get filter by ID
pub async fn get_filter(
    State(configs): State<ConfigStore>,
    Path(filter_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EventFilter>>, ApiError> {
    match configs.get_filter(filter_id).await? {
        Some(filter) => Ok(ApiResponse::ok(filter)),
        None => Err(ApiError::not_found("filter not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFilterRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub conditions: Vec<FilterCondition>,
    pub action: FilterAction,
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// POST /api/filters - Create a new filter
pub async fn create_filter(
    State(configs): State<ConfigStore>,
    Json(req): Json<CreateFilterRequest>,
) -> Result<Json<ApiResponse<EventFilter>>, ApiError> {
    if req.action == FilterAction::Transform && req.transformation.is_none() {
        return Err(ApiError::bad_request("transform filters need a transformation name"));
    }

    let mut filter = EventFilter::new(req.name, req.conditions, req.action);
    filter.description = req.description;
    filter.transformation = req.transformation;
    filter.priority = req.priority;

    configs.put_filter(&filter).await?;
    Ok(ApiResponse::ok(filter))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFilterRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub conditions: Option<Vec<FilterCondition>>,
    pub action: Option<FilterAction>,
    pub transformation: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

/// PUT /api/filters/:filter_id - Update filter
pub async fn update_filter(
    State(configs): State<ConfigStore>,
    Path(filter_id): Path<Uuid>,
    Json(req): Json<UpdateFilterRequest>,
) -> Result<Json<ApiResponse<EventFilter>>, ApiError> {
    let Some(mut filter) = configs.get_filter(filter_id).await? else {
        return Err(ApiError::not_found("filter not found"));
    };

    if let Some(name) = req.name {
        filter.name = name;
    }
    if let Some(description) = req.description {
        filter.description = Some(description);
    }
    if let Some(conditions) = req.conditions {
        filter.conditions = conditions;
    }
    if let Some(action) = req.action {
        filter.action = action;
    }
    if let Some(transformation) = req.transformation {
        filter.transformation = Some(transformation);
    }
    if let Some(priority) = req.priority {
        filter.priority = priority;
    }
    if let Some(enabled) = req.enabled {
        filter.enabled = enabled;
    }
    filter.updated_at = chrono::Utc::now();

    configs.put_filter(&filter).await?;
    Ok(ApiResponse::ok(filter))
}

/// DELETE /api/filters/:filter_id - Delete filter
pub async fn delete_filter(
    State(configs): State<ConfigStore>,
    Path(filter_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !configs.delete_filter(filter_id).await? {
        return Err(ApiError::not_found("filter not found"));
    }
    Ok(ApiResponse::ok(serde_json::json!({"deleted": filter_id})))
}

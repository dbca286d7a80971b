use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::{ApiResponse, PageParams, PaginatedResponse};
use crate::models::{AgentEndpoint, DeliveryMethod};
use crate::storage::ConfigStore;

/// GET /api/agents - List the agent directory
pub async fn list_agents(
    State(configs): State<ConfigStore>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<AgentEndpoint>>>, ApiError> {
    let agents = configs.list_agents().await?;
    Ok(ApiResponse::ok(PaginatedResponse::paginate(agents, &params)))
}

/// GET /api/agents/:agent_id - Get agent endpoint by ID
pub async fn get_agent(
    State(configs): State<ConfigStore>,
    Path(agent_id): Path<String>,
) -> Result<Json<ApiResponse<AgentEndpoint>>, ApiError> {
    match configs.get_agent(&agent_id).await? {
        Some(agent) => Ok(ApiResponse::ok(agent)),
        None => Err(ApiError::not_found("agent not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_id: String,
    pub method: DeliveryMethod,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub max_stream_connections: Option<usize>,
}

/// POST /api/agents - Register or replace an agent endpoint
pub async fn register_agent(
    State(configs): State<ConfigStore>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<Json<ApiResponse<AgentEndpoint>>, ApiError> {
    if req.method == DeliveryMethod::Webhook && req.endpoint.is_none() {
        return Err(ApiError::bad_request("webhook agents need an endpoint"));
    }

    let now = chrono::Utc::now();
    let created_at = match configs.get_agent(&req.agent_id).await? {
        Some(existing) => existing.created_at,
        None => now,
    };
    let agent = AgentEndpoint {
        agent_id: req.agent_id,
        method: req.method,
        endpoint: req.endpoint,
        max_stream_connections: req.max_stream_connections.unwrap_or(4),
        created_at,
        updated_at: now,
    };

    configs.put_agent(&agent).await?;
    Ok(ApiResponse::ok(agent))
}

/// DELETE /api/agents/:agent_id - Remove an agent from the directory
pub async fn delete_agent(
    State(configs): State<ConfigStore>,
    Path(agent_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !configs.delete_agent(&agent_id).await? {
        return Err(ApiError::not_found("agent not found"));
    }
    Ok(ApiResponse::ok(serde_json::json!({"deleted": agent_id})))
}

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::Queue;
use crate::api::ApiResponse;
use crate::api::error::ApiError;

/// POST /api/deadletters/:event_id/:agent_id/replay - Re-enqueue a
/// dead-lettered event for one target with a fresh attempt budget
pub async fn replay_dead_letter(
    State(queue): State<Queue>,
    Path((event_id, agent_id)): Path<(Uuid, String)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    match queue.replay_dead_letter(event_id, &agent_id).await? {
        Some(item_id) => Ok(ApiResponse::ok(serde_json::json!({
            "event_id": event_id,
            "agent_id": agent_id,
            "item_id": item_id,
        }))),
        None => Err(ApiError::not_found("no dead-letter for this event and agent")),
    }
}

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use crate::{HookbusError, Pipeline};
use crate::api::ApiResponse;
use crate::api::error::ApiError;
use crate::models::EventSource;
use crate::pipeline::IngestOutcome;
use crate::validator::IngestHeaders;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

/// POST /ingest/:source - Accept one raw event from an external source.
///
/// Authentication is the HMAC signature over the body; this endpoint sits
/// outside the bearer-token layer.
pub async fn ingest_event(
    State(pipeline): State<Pipeline>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<IngestOutcome>>, ApiError> {
    let source = EventSource::parse(&source)
        .ok_or_else(|| HookbusError::NotFound(format!("unknown source '{source}'")))?;

    let ingest_headers = IngestHeaders {
        signature: header(&headers, "x-hookbus-signature"),
        event_type: header(&headers, "x-hookbus-event"),
        correlation_id: header(&headers, "x-hookbus-correlation-id"),
        identifier: header(&headers, "x-hookbus-identifier"),
    };

    let outcome = pipeline.ingest(source, &ingest_headers, &body).await?;
    Ok(ApiResponse::ok(outcome))
}

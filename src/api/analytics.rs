use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::Metrics;
use crate::api::ApiResponse;
use crate::api::error::ApiError;
use crate::models::AnalyticsData;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    /// Range start; defaults to one hour ago
    pub from: Option<DateTime<Utc>>,
    /// Range end; defaults to now
    pub to: Option<DateTime<Utc>>,
}

/// GET /api/analytics - Aggregate lifecycle metrics over a time range
pub async fn get_analytics(
    State(metrics): State<Metrics>,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<ApiResponse<AnalyticsData>>, ApiError> {
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or_else(|| to - Duration::hours(1));
    if from > to {
        return Err(ApiError::bad_request("'from' must not be after 'to'"));
    }

    Ok(ApiResponse::ok(metrics.aggregate(from, to).await))
}

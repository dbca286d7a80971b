pub mod agents;
pub mod analytics;
pub mod deadletters;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod routes;
pub mod stream;
pub mod subscriptions;

use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Uniform response envelope for the HTTP API
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        })
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    50
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

impl<T> PaginatedResponse<T> {
    /// Slice one page out of a fully-loaded list
    pub fn paginate(mut items: Vec<T>, params: &PageParams) -> Self {
        let total = items.len();
        let per_page = params.per_page.max(1);
        let page = params.page.max(1);
        let start = (page - 1).saturating_mul(per_page).min(total);
        let end = start.saturating_add(per_page).min(total);
        let items = items.drain(start..end).collect();
        Self {
            items,
            total,
            page,
            per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_slices_and_reports_total() {
        let items: Vec<u32> = (0..25).collect();
        let page = PaginatedResponse::paginate(
            items,
            &PageParams {
                page: 2,
                per_page: 10,
            },
        );

        assert_eq!(page.total, 25);
        assert_eq!(page.items, (10..20).collect::<Vec<u32>>());
    }

    #[test]
    fn test_paginate_past_end_is_empty() {
        let page = PaginatedResponse::paginate(
            vec![1, 2, 3],
            &PageParams {
                page: 5,
                per_page: 10,
            },
        );

        assert_eq!(page.total, 3);
        assert!(page.items.is_empty());
    }
}

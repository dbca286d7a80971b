use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::config::Settings;

/// Simple Bearer token authentication middleware for the admin API.
///
/// The ingestion endpoint and stream WebSocket authenticate on their own
/// (signature verification and bearer-or-query token respectively) and are
/// mounted outside this layer.
pub async fn auth_middleware(
    State(settings): State<Settings>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = auth_header.and_then(|auth| auth.strip_prefix("Bearer "));

    match token {
        Some(t) if t == settings.admin_token => {
            debug!("Token authenticated");
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!("Invalid token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            debug!("No token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Token check shared with handlers that accept a query-string token
/// fallback (WebSocket clients cannot always set headers)
pub fn token_matches(settings: &Settings, bearer: Option<&str>, query_token: Option<&str>) -> bool {
    match (bearer, query_token) {
        (Some(t), _) if t == settings.admin_token => true,
        (Some(_), _) => {
            warn!("Invalid Bearer token provided");
            false
        }
        (None, Some(t)) if t == settings.admin_token => {
            warn!("Authenticated via query token; prefer Authorization header");
            true
        }
        (None, Some(_)) => {
            warn!("Invalid query token provided");
            false
        }
        _ => false,
    }
}

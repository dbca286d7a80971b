//! WebSocket API for live event streaming to agents.
//!
//! Delivery here is best-effort: a message lost to a lagged or closed
//! connection is not retried, the durable queue path covers guaranteed
//! delivery. Heartbeats are fanned out by the dispatcher's background
//! task and forwarded to every connection.

use std::time::Duration;

use axum::{
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::Streams;
use crate::api::error::ApiError;
use crate::auth::token_matches;
use crate::config::Settings;
use crate::models::{EventSource, StreamMessage};
use crate::storage::ConfigStore;
use crate::stream::matches_patterns;

/// WebSocket subscription parameters
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Event types to receive (comma-separated, trailing `*` wildcard)
    /// Examples: "issues.opened", "issues.*"
    pub patterns: Option<String>,

    /// Optional source filter (only events from this source)
    pub source: Option<String>,

    /// Optional token for authentication (prefer Authorization header)
    pub token: Option<String>,
}

/// GET /ws/agents/:agent_id/stream
/// Open a live event stream for one agent.
pub async fn ws_agent_stream(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(streams): State<Streams>,
    State(configs): State<ConfigStore>,
    State(settings): State<Settings>,
    Path(agent_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Response {
    // Authenticate: prefer Bearer token in header, fall back to query
    // parameter (browser WebSocket clients cannot set headers)
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));

    if !token_matches(&settings, bearer, params.token.as_deref()) {
        warn!(agent_id = %agent_id, "unauthorized stream connection");
        return ApiError::from(crate::HookbusError::Unauthorized(
            "invalid or missing token".to_string(),
        ))
        .into_response();
    }

    let source_filter = match &params.source {
        Some(s) => match EventSource::parse(s) {
            Some(source) => Some(source),
            None => return ApiError::bad_request(format!("unknown source '{s}'")).into_response(),
        },
        None => None,
    };

    let patterns: Option<Vec<String>> = params
        .patterns
        .as_ref()
        .map(|s| s.split(',').map(|p| p.trim().to_string()).collect());

    // Connection cap from the agent directory when registered there
    let max_connections = match configs.get_agent(&agent_id).await {
        Ok(agent) => agent.map(|a| a.max_stream_connections),
        Err(e) => return ApiError::internal(e.to_string()).into_response(),
    };

    // Claim the slot before upgrading so an over-limit client gets a real
    // HTTP error instead of an immediately-closed socket
    let rx = match streams.subscribe(&agent_id, max_connections).await {
        Ok(rx) => rx,
        Err(e) => return ApiError::from(e).into_response(),
    };

    info!(agent_id = %agent_id, patterns = ?patterns, "stream connection established");

    let idle_timeout = Duration::from_secs(settings.stream.idle_timeout_secs);
    ws.on_upgrade(move |socket| {
        handle_agent_socket(socket, streams, agent_id, rx, patterns, source_filter, idle_timeout)
    })
}

async fn handle_agent_socket(
    socket: WebSocket,
    streams: Streams,
    agent_id: String,
    mut event_rx: broadcast::Receiver<StreamMessage>,
    patterns: Option<Vec<String>>,
    source_filter: Option<EventSource>,
    idle_timeout: Duration,
) {
    let (mut tx, mut rx) = socket.split();

    // Send subscription acknowledgment
    let ack = StreamMessage::Subscribed {
        agent_id: agent_id.clone(),
        patterns: patterns.clone(),
    };
    if let Ok(json) = serde_json::to_string(&ack) {
        let _ = tx.send(Message::Text(json)).await;
    }

    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // Receive messages from the dispatcher
            msg = event_rx.recv() => {
                match msg {
                    Ok(message) => {
                        // Events honor the connection's filters; heartbeats
                        // and dispatcher-level errors pass through
                        if let StreamMessage::Event { ref event_type, source, .. } = message {
                            if !matches_patterns(event_type, &patterns) {
                                continue;
                            }
                            if let Some(filter) = source_filter {
                                if source != filter {
                                    continue;
                                }
                            }
                        }
                        if let Ok(json) = serde_json::to_string(&message) {
                            if tx.send(Message::Text(json)).await.is_err() {
                                debug!("client disconnected, closing event stream");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(agent_id = %agent_id, lagged = n, "stream lagged, messages dropped");
                        let err_msg = StreamMessage::Error {
                            message: format!("stream lagged by {} messages, consider reconnecting", n),
                        };
                        if let Ok(json) = serde_json::to_string(&err_msg) {
                            let _ = tx.send(Message::Text(json)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(agent_id = %agent_id, "dispatcher channel closed");
                        break;
                    }
                }
            }

            // Handle client messages
            msg = rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Close(_))) => {
                        debug!(agent_id = %agent_id, "client sent close frame");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("received pong from client");
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(message = %text, "received text message from client");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error");
                        break;
                    }
                    None => {
                        debug!(agent_id = %agent_id, "client disconnected");
                        break;
                    }
                    _ => {}
                }
            }

            // Close connections with no client traffic
            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                info!(agent_id = %agent_id, "closing idle stream connection");
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    streams.disconnect(&agent_id).await;
    info!(agent_id = %agent_id, "stream connection closed");
}

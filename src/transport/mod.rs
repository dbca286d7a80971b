//! Outbound transports: how a resolved event actually reaches an agent.
//!
//! The delivery queue sees only the `DeliveryTransport` trait; webhook,
//! in-process message and stream push are interchangeable behind it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::models::{AgentEndpoint, DeliveryMethod, EventData};
use crate::stream::StreamDispatcher;

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, endpoint: &AgentEndpoint, event: &EventData) -> Result<()>;
}

/// HTTP POST of the canonical event as JSON
pub struct WebhookTransport {
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    async fn deliver(&self, endpoint: &AgentEndpoint, event: &EventData) -> Result<()> {
        let url = endpoint
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("agent '{}' has no webhook endpoint", endpoint.agent_id))?;

        let response = self.client.post(url).json(event).send().await?;
        if !response.status().is_success() {
            bail!("webhook to '{}' returned {}", endpoint.agent_id, response.status());
        }

        debug!(agent_id = %endpoint.agent_id, event_id = %event.id, "webhook delivered");
        Ok(())
    }
}

/// In-process channel per agent; consumers register a receiver
pub struct MessageTransport {
    channels: RwLock<HashMap<String, mpsc::Sender<EventData>>>,
}

impl MessageTransport {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Register an in-process consumer for an agent id
    pub async fn register(&self, agent_id: impl Into<String>) -> mpsc::Receiver<EventData> {
        let (tx, rx) = mpsc::channel(256);
        let mut channels = self.channels.write().await;
        channels.insert(agent_id.into(), tx);
        rx
    }
}

impl Default for MessageTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryTransport for MessageTransport {
    async fn deliver(&self, endpoint: &AgentEndpoint, event: &EventData) -> Result<()> {
        let channels = self.channels.read().await;
        let tx = channels
            .get(&endpoint.agent_id)
            .ok_or_else(|| anyhow!("no message consumer registered for agent '{}'", endpoint.agent_id))?;
        tx.send(event.clone())
            .await
            .map_err(|_| anyhow!("message consumer for agent '{}' is gone", endpoint.agent_id))?;
        Ok(())
    }
}

/// Push onto the agent's live stream. Best-effort by design: succeeds even
/// when no connection is open, because streaming loss is covered by the
/// queued fan-out path.
pub struct StreamTransport {
    dispatcher: Arc<StreamDispatcher>,
}

impl StreamTransport {
    pub fn new(dispatcher: Arc<StreamDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl DeliveryTransport for StreamTransport {
    async fn deliver(&self, endpoint: &AgentEndpoint, event: &EventData) -> Result<()> {
        let reached = self.dispatcher.publish(&endpoint.agent_id, event).await;
        debug!(agent_id = %endpoint.agent_id, event_id = %event.id, reached, "stream push");
        Ok(())
    }
}

/// Dispatches on the endpoint's declared method
pub struct AgentTransport {
    webhook: WebhookTransport,
    message: Arc<MessageTransport>,
    stream: StreamTransport,
}

impl AgentTransport {
    pub fn new(message: Arc<MessageTransport>, dispatcher: Arc<StreamDispatcher>) -> Self {
        Self {
            webhook: WebhookTransport::new(),
            message,
            stream: StreamTransport::new(dispatcher),
        }
    }
}

#[async_trait]
impl DeliveryTransport for AgentTransport {
    async fn deliver(&self, endpoint: &AgentEndpoint, event: &EventData) -> Result<()> {
        match endpoint.method {
            DeliveryMethod::Webhook => self.webhook.deliver(endpoint, event).await,
            DeliveryMethod::Message => self.message.deliver(endpoint, event).await,
            DeliveryMethod::Stream => self.stream.deliver(endpoint, event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSource;
    use chrono::Utc;
    use serde_json::json;

    fn endpoint(agent_id: &str, method: DeliveryMethod) -> AgentEndpoint {
        AgentEndpoint {
            agent_id: agent_id.to_string(),
            method,
            endpoint: None,
            max_stream_connections: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_message_transport_round_trip() {
        let transport = MessageTransport::new();
        let mut rx = transport.register("worker").await;

        let event = EventData::new(EventSource::Custom, "job.created", json!({"id": 1}));
        transport
            .deliver(&endpoint("worker", DeliveryMethod::Message), &event)
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
    }

    #[tokio::test]
    async fn test_message_transport_unregistered_agent_fails() {
        let transport = MessageTransport::new();
        let event = EventData::new(EventSource::Custom, "job.created", json!({}));

        let result = transport
            .deliver(&endpoint("ghost", DeliveryMethod::Message), &event)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_webhook_transport_requires_endpoint() {
        let transport = WebhookTransport::new();
        let event = EventData::new(EventSource::Github, "push", json!({}));

        let result = transport
            .deliver(&endpoint("hook", DeliveryMethod::Webhook), &event)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stream_transport_is_best_effort() {
        let transport = StreamTransport::new(Arc::new(StreamDispatcher::new(4)));
        let event = EventData::new(EventSource::Slack, "message", json!({}));

        // No open connection; still reports success
        transport
            .deliver(&endpoint("viewer", DeliveryMethod::Stream), &event)
            .await
            .unwrap();
    }
}

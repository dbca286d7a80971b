//! Stream dispatcher: live, best-effort push delivery.
//!
//! One broadcast channel per agent id. Push is never retried; a missed
//! message is covered by the agent reconnecting or falling back to the
//! queued delivery path. Connection slots per agent are bounded and freed
//! immediately on disconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::HookbusError;
use crate::models::{EventData, StreamMessage};

const CHANNEL_CAPACITY: usize = 256;

pub struct StreamDispatcher {
    /// agent_id -> broadcast sender
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<StreamMessage>>>>,
    /// agent_id -> open connection count
    connections: Arc<RwLock<HashMap<String, usize>>>,
    default_max_per_agent: usize,
}

impl StreamDispatcher {
    pub fn new(default_max_per_agent: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            default_max_per_agent,
        }
    }

    /// Claim a connection slot and subscribe to the agent's stream.
    ///
    /// `max_connections` overrides the dispatcher default when the agent
    /// directory declares one.
    pub async fn subscribe(
        &self,
        agent_id: &str,
        max_connections: Option<usize>,
    ) -> Result<broadcast::Receiver<StreamMessage>, HookbusError> {
        let cap = max_connections.unwrap_or(self.default_max_per_agent);

        let mut connections = self.connections.write().await;
        let open = connections.entry(agent_id.to_string()).or_insert(0);
        if *open >= cap {
            return Err(HookbusError::Validation(format!(
                "agent '{agent_id}' already has {open} open stream connections (limit {cap})"
            )));
        }
        *open += 1;

        let mut channels = self.channels.write().await;
        let rx = match channels.get(agent_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
                channels.insert(agent_id.to_string(), tx);
                rx
            }
        };
        debug!(agent_id = %agent_id, open = *open, "stream connection opened");
        Ok(rx)
    }

    /// Release a connection slot. No further deliveries are attempted for
    /// the released connection.
    pub async fn disconnect(&self, agent_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(open) = connections.get_mut(agent_id) {
            *open = open.saturating_sub(1);
            if *open == 0 {
                connections.remove(agent_id);
            }
        }
        debug!(agent_id = %agent_id, "stream connection closed");
    }

    /// Push an event to every open connection for this agent. Best-effort:
    /// returns the number of receivers the message reached.
    pub async fn publish(&self, agent_id: &str, event: &EventData) -> usize {
        let channels = self.channels.read().await;
        match channels.get(agent_id) {
            Some(tx) => tx.send(StreamMessage::event(event)).unwrap_or(0),
            None => 0,
        }
    }

    /// Broadcast a heartbeat to every agent channel
    pub async fn heartbeat(&self) {
        let at = chrono::Utc::now();
        let channels = self.channels.read().await;
        for tx in channels.values() {
            let _ = tx.send(StreamMessage::Heartbeat { at });
        }
    }

    pub async fn connection_count(&self, agent_id: &str) -> usize {
        let connections = self.connections.read().await;
        connections.get(agent_id).copied().unwrap_or(0)
    }

    /// Drop channels with no live receivers
    pub async fn cleanup_idle_channels(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// Check an event type against connection-level patterns. A trailing `*`
/// matches any suffix; no patterns means everything.
pub fn matches_patterns(event_type: &str, patterns: &Option<Vec<String>>) -> bool {
    match patterns {
        Some(patterns) => patterns.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix('*') {
                event_type.starts_with(prefix)
            } else {
                event_type == pattern
            }
        }),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSource;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let dispatcher = StreamDispatcher::new(4);
        let mut rx = dispatcher.subscribe("notifier", None).await.unwrap();

        let event = EventData::new(EventSource::Github, "issues.opened", json!({"n": 1}));
        let reached = dispatcher.publish("notifier", &event).await;
        assert_eq!(reached, 1);

        match rx.recv().await.unwrap() {
            StreamMessage::Event { id, event_type, .. } => {
                assert_eq!(id, event.id);
                assert_eq!(event_type, "issues.opened");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_connections_is_noop() {
        let dispatcher = StreamDispatcher::new(4);
        let event = EventData::new(EventSource::Slack, "message", json!({}));
        assert_eq!(dispatcher.publish("nobody", &event).await, 0);
    }

    #[tokio::test]
    async fn test_connection_cap_enforced_and_freed() {
        let dispatcher = StreamDispatcher::new(2);

        let _a = dispatcher.subscribe("agent", None).await.unwrap();
        let _b = dispatcher.subscribe("agent", None).await.unwrap();
        assert!(dispatcher.subscribe("agent", None).await.is_err());

        dispatcher.disconnect("agent").await;
        assert_eq!(dispatcher.connection_count("agent").await, 1);
        assert!(dispatcher.subscribe("agent", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_per_agent_cap_override() {
        let dispatcher = StreamDispatcher::new(1);
        let _a = dispatcher.subscribe("big", Some(3)).await.unwrap();
        let _b = dispatcher.subscribe("big", Some(3)).await.unwrap();
        assert_eq!(dispatcher.connection_count("big").await, 2);
    }

    #[test]
    fn test_pattern_matching() {
        let patterns = Some(vec!["issues.*".to_string(), "push".to_string()]);
        assert!(matches_patterns("issues.opened", &patterns));
        assert!(matches_patterns("push", &patterns));
        assert!(!matches_patterns("pull_request.opened", &patterns));
        assert!(matches_patterns("anything", &None));
    }
}

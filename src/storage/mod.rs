//! Collaborator storage contracts.
//!
//! The router core does not implement durability itself; it consumes a
//! key-value store (filter/route/subscription/rate-limit/queue state) and
//! an object store (archive and dead-letter records) behind these traits.
//! `memory` backs tests and the default dev profile, `postgres` backs
//! production deployments.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{AgentEndpoint, EventFilter, EventRoute};

pub use memory::{MemoryKeyValueStore, MemoryObjectStore};
pub use postgres::{PgKeyValueStore, PgObjectStore, PgStorage};

/// Durable key-value store with optional TTL
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Option<chrono::Duration>) -> Result<()>;

    /// Returns true when the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All live entries whose key starts with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>>;
}

/// Durable record of terminal outcomes, keyed by event id
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

/// Typed access to configuration entities in the key-value store.
///
/// Filters, routes and agent endpoints are stored as JSON under
/// `filter/`, `route/` and `agent/` prefixes.
#[derive(Clone)]
pub struct ConfigStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> Arc<dyn KeyValueStore> {
        self.kv.clone()
    }

    async fn put_entity<T: Serialize>(&self, key: String, entity: &T) -> Result<()> {
        self.kv.put(&key, serde_json::to_value(entity)?, None).await
    }

    async fn get_entity<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>> {
        match self.kv.get(&key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn list_entities<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for (key, value) in self.kv.scan_prefix(prefix).await? {
            match serde_json::from_value(value) {
                Ok(entity) => out.push(entity),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping undecodable config entry"),
            }
        }
        Ok(out)
    }

    // Filters

    pub async fn put_filter(&self, filter: &EventFilter) -> Result<()> {
        self.put_entity(format!("filter/{}", filter.id), filter).await
    }

    pub async fn get_filter(&self, id: Uuid) -> Result<Option<EventFilter>> {
        self.get_entity(format!("filter/{id}")).await
    }

    pub async fn list_filters(&self) -> Result<Vec<EventFilter>> {
        self.list_entities("filter/").await
    }

    pub async fn delete_filter(&self, id: Uuid) -> Result<bool> {
        self.kv.delete(&format!("filter/{id}")).await
    }

    // Routes

    pub async fn put_route(&self, route: &EventRoute) -> Result<()> {
        self.put_entity(format!("route/{}", route.id), route).await
    }

    pub async fn get_route(&self, id: Uuid) -> Result<Option<EventRoute>> {
        self.get_entity(format!("route/{id}")).await
    }

    pub async fn list_routes(&self) -> Result<Vec<EventRoute>> {
        self.list_entities("route/").await
    }

    pub async fn delete_route(&self, id: Uuid) -> Result<bool> {
        self.kv.delete(&format!("route/{id}")).await
    }

    // Agent directory

    pub async fn put_agent(&self, agent: &AgentEndpoint) -> Result<()> {
        self.put_entity(format!("agent/{}", agent.agent_id), agent).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentEndpoint>> {
        self.get_entity(format!("agent/{agent_id}")).await
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentEndpoint>> {
        self.list_entities("agent/").await
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<bool> {
        self.kv.delete(&format!("agent/{agent_id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterAction, FilterCondition, FilterOperator};
    use serde_json::json;

    #[tokio::test]
    async fn test_config_store_filter_round_trip() {
        let store = ConfigStore::new(Arc::new(MemoryKeyValueStore::new()));
        let filter = EventFilter::new(
            "opened",
            vec![FilterCondition {
                field: "action".to_string(),
                operator: FilterOperator::Equals,
                value: json!("opened"),
                case_insensitive: false,
            }],
            FilterAction::Include,
        );

        store.put_filter(&filter).await.unwrap();

        let loaded = store.get_filter(filter.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "opened");

        assert_eq!(store.list_filters().await.unwrap().len(), 1);
        assert!(store.delete_filter(filter.id).await.unwrap());
        assert!(store.get_filter(filter.id).await.unwrap().is_none());
    }
}

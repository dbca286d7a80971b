//! PostgreSQL store implementations

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls};
use tracing::error;

use super::{KeyValueStore, ObjectStore};

/// Shared connection; hands out the store implementations
pub struct PgStorage {
    client: Arc<Client>,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {}", e);
            }
        });

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        self.client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    key        TEXT PRIMARY KEY,
                    value      JSONB NOT NULL,
                    expires_at TIMESTAMPTZ
                );

                CREATE TABLE IF NOT EXISTS archive_objects (
                    key        TEXT PRIMARY KEY,
                    value      JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );
                "#,
            )
            .await?;
        Ok(())
    }

    pub fn key_value(&self) -> PgKeyValueStore {
        PgKeyValueStore {
            client: self.client.clone(),
        }
    }

    pub fn objects(&self) -> PgObjectStore {
        PgObjectStore {
            client: self.client.clone(),
        }
    }
}

pub struct PgKeyValueStore {
    client: Arc<Client>,
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT value FROM kv_entries
                WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
                "#,
                &[&key],
            )
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Option<chrono::Duration>) -> Result<()> {
        let expires_at: Option<DateTime<Utc>> = ttl.map(|d| Utc::now() + d);

        self.client
            .execute(
                r#"
                INSERT INTO kv_entries (key, value, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (key) DO UPDATE SET value = $2, expires_at = $3
                "#,
                &[&key, &value, &expires_at],
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let deleted = self
            .client
            .execute("DELETE FROM kv_entries WHERE key = $1", &[&key])
            .await?;

        Ok(deleted > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));

        let rows = self
            .client
            .query(
                r#"
                SELECT key, value FROM kv_entries
                WHERE key LIKE $1 AND (expires_at IS NULL OR expires_at > now())
                ORDER BY key ASC
                "#,
                &[&pattern],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }
}

pub struct PgObjectStore {
    client: Arc<Client>,
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.client
            .execute(
                r#"
                INSERT INTO archive_objects (key, value)
                VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET value = $2
                "#,
                &[&key, &value],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = self
            .client
            .query_opt("SELECT value FROM archive_objects WHERE key = $1", &[&key])
            .await?;

        Ok(row.map(|r| r.get("value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_traits_implemented() {
        // Compile-time check that the Pg stores satisfy the collaborator traits
        fn _assert_kv<T: KeyValueStore>() {}
        fn _assert_obj<T: ObjectStore>() {}
        _assert_kv::<PgKeyValueStore>();
        _assert_obj::<PgObjectStore>();
    }
}

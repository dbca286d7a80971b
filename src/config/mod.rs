use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::models::RateLimitConfig;

/// Delivery queue tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueSettings {
    /// Per-attempt timeout in seconds (default: 30)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_attempt_timeout() -> u64 {
    30
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

/// Live stream tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamSettings {
    /// Connection slots per agent unless the directory says otherwise
    #[serde(default = "default_max_connections")]
    pub max_connections_per_agent: usize,
    /// Heartbeat interval in seconds (default: 30)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    /// Close a connection after this long without client traffic
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    4
}

fn default_heartbeat() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    300
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_connections_per_agent: default_max_connections(),
            heartbeat_secs: default_heartbeat(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token for the admin API and stream connections
    pub admin_token: String,
    /// When absent, state lives in memory only
    #[serde(default)]
    pub database_url: Option<String>,
    /// Signing secret per accepted source ("github", "stripe", ...)
    #[serde(default)]
    pub source_secrets: HashMap<String, String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables (with prefix HOOKBUS)
            .add_source(Environment::with_prefix("HOOKBUS").separator("_"))
            .build()?;

        s.try_deserialize()
    }
}

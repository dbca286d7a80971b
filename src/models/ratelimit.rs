use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions per window before the limiter starts counting overflow
    pub limit: u32,
    pub window_secs: u64,
    /// Short overflow allowance above `limit`; admission is denied once the
    /// window count exceeds `limit + burst`
    #[serde(default)]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_secs: 60,
            burst: 20,
        }
    }
}

/// Per-(source, identifier) window counter. Mutated only by the rate
/// limiter, under a single per-key lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    pub key: String,
    pub count: u32,
    pub reset_time: DateTime<Utc>,
    /// Set once the window ran past `limit`, before hard rejection began
    pub blocked: bool,
}

impl RateLimitState {
    pub fn fresh(key: impl Into<String>, window: chrono::Duration) -> Self {
        Self {
            key: key.into(),
            count: 0,
            reset_time: Utc::now() + window,
            blocked: false,
        }
    }
}

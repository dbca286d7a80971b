use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Contains,
    Regex,
    Exists,
    Gt,
    Lt,
    In,
    NotIn,
}

/// A single predicate against a payload field.
///
/// `field` is a dot-path into the payload ("pull_request.user.login").
/// Absent or type-mismatched fields evaluate `exists` false and every
/// comparison operator false; a condition never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Case-insensitive mode for string comparisons
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Pass the event through only if every condition holds
    Include,
    /// Drop the event if every condition holds
    Exclude,
    /// Always pass; mark the event for the named transformation when the
    /// conditions hold
    Transform,
}

/// Named, prioritized predicate set. Configuration entity: written by the
/// admin API, read-only to the pipeline at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub conditions: Vec<FilterCondition>,
    pub action: FilterAction,
    /// Transformation name used when `action` is `transform`
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn default_enabled() -> bool {
    true
}

impl EventFilter {
    pub fn new(name: impl Into<String>, conditions: Vec<FilterCondition>, action: FilterAction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            conditions,
            action,
            transformation: None,
            priority: 0,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

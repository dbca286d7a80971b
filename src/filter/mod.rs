//! Filter engine: pure predicate evaluation over event payloads.
//!
//! Evaluation never errors. A missing or type-mismatched field makes
//! `exists` false and every comparison operator false, so one malformed
//! condition cannot abort the pipeline for unrelated filters.

use serde_json::Value;

use crate::models::{EventFilter, FilterAction, FilterCondition, FilterOperator};

/// Effect of applying one filter to a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Event continues down this path
    Pass,
    /// Event is dropped from this path
    Drop,
    /// Event continues, marked for the named transformation
    Transform(String),
}

/// Resolve a dot-path into a payload. Array segments may be numeric
/// indices ("items.0.sku").
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// All conditions AND-combined; the empty set matches
pub fn matches(payload: &Value, conditions: &[FilterCondition]) -> bool {
    conditions.iter().all(|c| condition_matches(payload, c))
}

pub fn condition_matches(payload: &Value, condition: &FilterCondition) -> bool {
    let field = resolve_path(payload, &condition.field);

    if condition.operator == FilterOperator::Exists {
        let expected = condition.value.as_bool().unwrap_or(true);
        return field.is_some() == expected;
    }

    let Some(actual) = field else {
        return false;
    };

    match condition.operator {
        FilterOperator::Equals => values_equal(actual, &condition.value, condition.case_insensitive),
        FilterOperator::Contains => contains(actual, &condition.value, condition.case_insensitive),
        FilterOperator::Regex => regex_matches(actual, &condition.value, condition.case_insensitive),
        FilterOperator::Gt => compare(actual, &condition.value, condition.case_insensitive)
            .map(|o| o == std::cmp::Ordering::Greater)
            .unwrap_or(false),
        FilterOperator::Lt => compare(actual, &condition.value, condition.case_insensitive)
            .map(|o| o == std::cmp::Ordering::Less)
            .unwrap_or(false),
        FilterOperator::In => in_set(actual, &condition.value, condition.case_insensitive),
        FilterOperator::NotIn => {
            condition.value.is_array() && !in_set(actual, &condition.value, condition.case_insensitive)
        }
        FilterOperator::Exists => unreachable!("handled above"),
    }
}

/// Apply a filter's action given its predicate result
pub fn apply(filter: &EventFilter, payload: &Value) -> FilterDecision {
    let matched = matches(payload, &filter.conditions);
    match filter.action {
        FilterAction::Include => {
            if matched {
                FilterDecision::Pass
            } else {
                FilterDecision::Drop
            }
        }
        FilterAction::Exclude => {
            if matched {
                FilterDecision::Drop
            } else {
                FilterDecision::Pass
            }
        }
        FilterAction::Transform => {
            if matched {
                match &filter.transformation {
                    Some(name) => FilterDecision::Transform(name.clone()),
                    None => FilterDecision::Pass,
                }
            } else {
                FilterDecision::Pass
            }
        }
    }
}

fn values_equal(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) if case_insensitive => a.eq_ignore_ascii_case(b),
        // Compare numbers numerically so 1 == 1.0
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

fn contains(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    match actual {
        Value::String(haystack) => match expected.as_str() {
            Some(needle) if case_insensitive => haystack.to_lowercase().contains(&needle.to_lowercase()),
            Some(needle) => haystack.contains(needle),
            None => false,
        },
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected, case_insensitive)),
        _ => false,
    }
}

fn regex_matches(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), expected.as_str()) else {
        return false;
    };
    let pattern = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    match regex::Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid regex in filter condition");
            false
        }
    }
}

fn compare(actual: &Value, expected: &Value, case_insensitive: bool) -> Option<std::cmp::Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) if case_insensitive => {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        }
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn in_set(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| values_equal(actual, item, case_insensitive)),
        _ => false,
    }
}

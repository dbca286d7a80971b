//! Route transformations applied to matched events.
//!
//! All transformations are pure: they never fail the pipeline. A
//! transformation whose config does not fit the payload degrades to a
//! pass-through of the original event.

use serde_json::{Map, Value, json};

use crate::filter::resolve_path;
use crate::models::{EventData, EventTransformation, TransformationKind};

/// Apply an optional transformation; `split` may fan one event into many
pub fn apply(transformation: Option<&EventTransformation>, event: &EventData) -> Vec<EventData> {
    let Some(t) = transformation else {
        return vec![event.clone()];
    };

    match t.kind {
        TransformationKind::Map => vec![map_fields(event, &t.config)],
        TransformationKind::Filter => vec![narrow_fields(event, &t.config)],
        TransformationKind::Enrich => vec![enrich(event, &t.config)],
        TransformationKind::Split => split(event, &t.config),
    }
}

/// `{"fields": {"dest": "source.dot.path", ...}}` — rewrite or add top-level
/// fields from paths into the original payload
fn map_fields(event: &EventData, config: &Value) -> EventData {
    let mut out = event.clone();
    let Some(fields) = config.get("fields").and_then(Value::as_object) else {
        return out;
    };

    let mut payload = match &event.payload {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (dest, source_path) in fields {
        if let Some(path) = source_path.as_str() {
            if let Some(value) = resolve_path(&event.payload, path) {
                payload.insert(dest.clone(), value.clone());
            }
        } else {
            // Non-string mapping values are literals
            payload.insert(dest.clone(), source_path.clone());
        }
    }
    out.payload = Value::Object(payload);
    out
}

/// `{"fields": ["a", "b.c"]}` — keep only the listed paths; each kept value
/// lands under its full path string as the key
fn narrow_fields(event: &EventData, config: &Value) -> EventData {
    let mut out = event.clone();
    let Some(fields) = config.get("fields").and_then(Value::as_array) else {
        return out;
    };

    let mut payload = Map::new();
    for field in fields {
        if let Some(path) = field.as_str() {
            if let Some(value) = resolve_path(&event.payload, path) {
                payload.insert(path.to_string(), value.clone());
            }
        }
    }
    out.payload = Value::Object(payload);
    out
}

/// `{"fields": {...}}` — merge configured statics plus derived metadata
/// (source, ingestion timestamp) into the payload
fn enrich(event: &EventData, config: &Value) -> EventData {
    let mut out = event.clone();
    let mut payload = match &event.payload {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Some(fields) = config.get("fields").and_then(Value::as_object) {
        for (key, value) in fields {
            payload.insert(key.clone(), value.clone());
        }
    }
    payload
        .entry("source".to_string())
        .or_insert_with(|| json!(event.source.as_str()));
    payload
        .entry("received_at".to_string())
        .or_insert_with(|| json!(event.timestamp.to_rfc3339()));

    out.payload = Value::Object(payload);
    out
}

/// `{"field": "items"}` — one derived event per element of the named array,
/// each carrying lineage back to the parent event
fn split(event: &EventData, config: &Value) -> Vec<EventData> {
    let Some(path) = config.get("field").and_then(Value::as_str) else {
        return vec![event.clone()];
    };
    let Some(Value::Array(items)) = resolve_path(&event.payload, path) else {
        return vec![event.clone()];
    };
    if items.is_empty() {
        return vec![event.clone()];
    }

    items.iter().map(|item| event.derive(item.clone())).collect()
}

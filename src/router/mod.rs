//! Rule-based router: matches events against ordered `EventRoute`s and
//! resolves target agents.
//!
//! Unlike a single-winner dispatcher, every enabled route whose filters
//! match is applied. Routes list their own target agents, and first-match
//! semantics would silently starve legitimate secondary consumers.

pub mod transform;

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;
use uuid::Uuid;

use crate::filter::{self, FilterDecision};
use crate::models::{EventData, EventFilter, EventRoute, RetryPolicy};
use crate::storage::ConfigStore;

/// One resolved unit of work: an (already transformed) event bound to a
/// single target agent under a route's retry policy
#[derive(Debug, Clone)]
pub struct ResolvedDelivery {
    pub route_id: Uuid,
    pub event: EventData,
    pub target_agent: String,
    pub retry_policy: RetryPolicy,
}

pub struct EventRouter {
    config: ConfigStore,
}

impl EventRouter {
    pub fn new(config: ConfigStore) -> Self {
        Self { config }
    }

    /// Evaluate all enabled routes in ascending priority order and fan out
    /// to every matching route's targets.
    pub async fn resolve(&self, event: &EventData) -> Result<Vec<ResolvedDelivery>> {
        let filters: HashMap<Uuid, EventFilter> = self
            .config
            .list_filters()
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let mut routes: Vec<EventRoute> = self
            .config
            .list_routes()
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();
        routes.sort_by_key(|r| r.priority);

        let mut deliveries = Vec::new();
        for route in &routes {
            let Some(transform_tags) = route_matches(route, &filters, event) else {
                continue;
            };

            debug!(
                route = %route.name,
                event_id = %event.id,
                targets = route.target_agents.len(),
                "route matched"
            );

            let mut matched = event.clone();
            for tag in transform_tags {
                matched.tags.push(format!("transform:{tag}"));
            }

            for transformed in transform::apply(route.transformation.as_ref(), &matched) {
                for agent in &route.target_agents {
                    deliveries.push(ResolvedDelivery {
                        route_id: route.id,
                        event: transformed.clone(),
                        target_agent: agent.clone(),
                        retry_policy: route.retry_policy.clone(),
                    });
                }
            }
        }

        Ok(deliveries)
    }
}

/// `None` when the route does not apply; otherwise the transformation names
/// collected from matching `transform`-action filters.
///
/// An empty `source_filters` list is an explicit catch-all. A referenced
/// filter that no longer exists fails the route rather than silently
/// widening it, and so does disabling every referenced filter: a route
/// that names filters only matches when at least one of them was actually
/// evaluated.
fn route_matches(
    route: &EventRoute,
    filters: &HashMap<Uuid, EventFilter>,
    event: &EventData,
) -> Option<Vec<String>> {
    if route.source_filters.is_empty() {
        return Some(Vec::new());
    }

    let mut tags = Vec::new();
    let mut evaluated = 0usize;
    for filter_id in &route.source_filters {
        let Some(f) = filters.get(filter_id) else {
            tracing::warn!(route = %route.name, filter_id = %filter_id, "route references missing filter");
            return None;
        };
        if !f.enabled {
            continue;
        }
        evaluated += 1;
        match filter::apply(f, &event.payload) {
            FilterDecision::Drop => return None,
            FilterDecision::Transform(name) => tags.push(name),
            FilterDecision::Pass => {}
        }
    }
    if evaluated == 0 {
        tracing::warn!(route = %route.name, "every filter referenced by this route is disabled");
        return None;
    }
    Some(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventSource, FilterAction, FilterCondition, FilterOperator};
    use crate::storage::MemoryKeyValueStore;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> ConfigStore {
        ConfigStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn opened_filter() -> EventFilter {
        EventFilter::new(
            "opened",
            vec![FilterCondition {
                field: "action".to_string(),
                operator: FilterOperator::Equals,
                value: json!("opened"),
                case_insensitive: false,
            }],
            FilterAction::Include,
        )
    }

    #[tokio::test]
    async fn test_empty_source_filters_is_catch_all() {
        let config = config();
        let route = EventRoute::new("all", vec!["auditor".to_string()]);
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Slack, "message", json!({"anything": true}));

        let deliveries = router.resolve(&event).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].target_agent, "auditor");
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_matching_routes() {
        let config = config();
        let filter = opened_filter();
        config.put_filter(&filter).await.unwrap();

        let mut first = EventRoute::new("notify", vec!["notifier".to_string()]);
        first.source_filters = vec![filter.id];
        first.priority = 1;
        config.put_route(&first).await.unwrap();

        let mut second = EventRoute::new("audit", vec!["auditor".to_string()]);
        second.source_filters = vec![filter.id];
        second.priority = 2;
        config.put_route(&second).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Github, "issues", json!({"action": "opened"}));

        let deliveries = router.resolve(&event).await.unwrap();
        let mut agents: Vec<&str> = deliveries.iter().map(|d| d.target_agent.as_str()).collect();
        agents.sort();
        assert_eq!(agents, vec!["auditor", "notifier"]);
    }

    #[tokio::test]
    async fn test_non_matching_route_is_skipped() {
        let config = config();
        let filter = opened_filter();
        config.put_filter(&filter).await.unwrap();

        let mut route = EventRoute::new("notify", vec!["notifier".to_string()]);
        route.source_filters = vec![filter.id];
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Github, "issues", json!({"action": "closed"}));

        assert!(router.resolve(&event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_route_never_matches() {
        let config = config();
        let mut route = EventRoute::new("all", vec!["auditor".to_string()]);
        route.enabled = false;
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Github, "push", json!({}));

        assert!(router.resolve(&event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_referenced_filters_disabled_fails_route() {
        let config = config();
        let mut filter = opened_filter();
        filter.enabled = false;
        config.put_filter(&filter).await.unwrap();

        let mut route = EventRoute::new("notify", vec!["notifier".to_string()]);
        route.source_filters = vec![filter.id];
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Github, "issues", json!({"action": "opened"}));

        // Disabling the route's last filter must not turn it into a catch-all
        assert!(router.resolve(&event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_referenced_filter_fails_route() {
        let config = config();
        let mut route = EventRoute::new("broken", vec!["x".to_string()]);
        route.source_filters = vec![Uuid::new_v4()];
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(EventSource::Github, "push", json!({}));

        assert!(router.resolve(&event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_transformation_fans_per_target() {
        let config = config();
        let mut route = EventRoute::new("per-commit", vec!["a".to_string(), "b".to_string()]);
        route.transformation = Some(crate::models::EventTransformation {
            kind: crate::models::TransformationKind::Split,
            config: json!({"field": "commits"}),
        });
        config.put_route(&route).await.unwrap();

        let router = EventRouter::new(config);
        let event = EventData::new(
            EventSource::Github,
            "push",
            json!({"commits": [{"id": 1}, {"id": 2}]}),
        );

        // 2 derived events x 2 targets
        let deliveries = router.resolve(&event).await.unwrap();
        assert_eq!(deliveries.len(), 4);
        assert!(deliveries.iter().all(|d| d.event.parent_event_id == Some(event.id)));
    }
}

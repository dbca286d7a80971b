pub mod delivery;
pub mod event;
pub mod filter;
pub mod metrics;
pub mod ratelimit;
pub mod route;
pub mod stream;
pub mod subscription;

pub use delivery::{AgentEndpoint, DeliveryError, DeliveryMethod, DeliveryStatus, RetryableEvent};
pub use event::{EventData, EventPriority, EventSource};
pub use filter::{EventFilter, FilterAction, FilterCondition, FilterOperator};
pub use metrics::{AnalyticsData, EventMetric, MetricStatus};
pub use ratelimit::{RateLimitConfig, RateLimitState};
pub use route::{BackoffStrategy, EventRoute, EventTransformation, RetryPolicy, TransformationKind};
pub use stream::StreamMessage;
pub use subscription::EventSubscription;

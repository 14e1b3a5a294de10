//! Metrics for the lineup matchmaking service
//!
//! Prometheus metric groups for the queue, the matching engine, the
//! notification hub and overall service health.

pub mod collector;

pub use collector::{
    pass_outcome, MatchingMetrics, MetricsCollector, MetricsTimer, NotificationMetrics,
    QueueMetrics, ServiceMetrics,
};

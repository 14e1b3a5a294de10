//! Metrics collection using Prometheus
//!
//! Metric groups for the lineup service. Every group registers its metrics
//! against the collector's registry on creation, so several collectors can
//! live side by side in tests.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome label values for matching passes
pub mod pass_outcome {
    /// Fewer candidates than a group needs
    pub const IDLE: &str = "idle";
    /// At least one group committed
    pub const MATCHED: &str = "matched";
    /// Enough candidates but no complete group
    pub const NO_MATCH: &str = "no_match";
    /// Snapshot or commit failed
    pub const FAILED: &str = "failed";
}

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    started_at: Instant,
    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    matching_metrics: MatchingMetrics,
    notification_metrics: NotificationMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Waiting queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently waiting
    pub queue_size: IntGauge,

    /// Accepted join requests
    pub joins_total: IntCounter,

    /// Leave requests by whether a player was removed
    pub leaves_total: IntCounterVec,

    /// Join requests refused before reaching the queue
    pub rejected_joins_total: IntCounterVec,
}

/// Matching engine metrics
#[derive(Clone)]
pub struct MatchingMetrics {
    /// Matching passes by outcome
    pub passes_total: IntCounterVec,

    /// Wall time of a matching pass
    pub pass_duration: Histogram,

    /// Matches committed and published
    pub matches_formed_total: IntCounter,

    /// Players removed from the queue into matches
    pub players_matched_total: IntCounter,

    /// Group commits that failed
    pub commit_failures_total: IntCounterVec,

    /// Tolerance band in force when a group filled
    pub match_band: Histogram,
}

/// Notification hub metrics
#[derive(Clone)]
pub struct NotificationMetrics {
    /// Connected subscribers
    pub subscribers: IntGauge,

    /// Events handed to the hub
    pub published_total: IntCounter,

    /// Deliveries dropped instead of blocking
    pub dropped_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let matching_metrics = MatchingMetrics::new(&registry)?;
        let notification_metrics = NotificationMetrics::new(&registry)?;

        Ok(Self {
            registry,
            started_at: Instant::now(),
            service_metrics,
            queue_metrics,
            matching_metrics,
            notification_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matching(&self) -> &MatchingMetrics {
        &self.matching_metrics
    }

    pub fn notifications(&self) -> &NotificationMetrics {
        &self.notification_metrics
    }

    /// Record an accepted join
    pub fn record_join(&self) {
        self.queue_metrics.joins_total.inc();
    }

    /// Record a join refused by validation or storage
    pub fn record_rejected_join(&self, reason: &str) {
        self.queue_metrics
            .rejected_joins_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a leave request
    pub fn record_leave(&self, removed: bool) {
        let label = if removed { "removed" } else { "not_queued" };
        self.queue_metrics
            .leaves_total
            .with_label_values(&[label])
            .inc();
    }

    /// Set the current queue size
    pub fn set_queue_size(&self, size: usize) {
        self.queue_metrics.queue_size.set(size as i64);
    }

    /// Record the end of a matching pass
    pub fn record_pass(&self, outcome: &str, duration: Duration) {
        self.matching_metrics
            .passes_total
            .with_label_values(&[outcome])
            .inc();
        self.matching_metrics
            .pass_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a committed match
    pub fn record_match(&self, players: usize, band: f64) {
        self.matching_metrics.matches_formed_total.inc();
        self.matching_metrics
            .players_matched_total
            .inc_by(players as u64);
        self.matching_metrics.match_band.observe(band);
    }

    /// Record a failed group commit
    pub fn record_commit_failure(&self, reason: &str) {
        self.matching_metrics
            .commit_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record an event handed to the notification hub
    pub fn record_notification_published(&self) {
        self.notification_metrics.published_total.inc();
    }

    /// Record a delivery dropped by the hub
    pub fn record_notification_dropped(&self, reason: &str, count: u64) {
        self.notification_metrics
            .dropped_total
            .with_label_values(&[reason])
            .inc_by(count);
    }

    /// Set the current subscriber count
    pub fn set_subscribers(&self, count: usize) {
        self.notification_metrics.subscribers.set(count as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Refresh the uptime gauge
    pub fn update_uptime(&self) {
        self.service_metrics
            .uptime_seconds
            .set(self.started_at.elapsed().as_secs() as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("lineup_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "lineup_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("lineup_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queue_size = IntGauge::new("lineup_queue_size", "Players currently waiting")?;
        registry.register(Box::new(queue_size.clone()))?;

        let joins_total = IntCounter::new("lineup_joins_total", "Accepted join requests")?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounterVec::new(
            Opts::new("lineup_leaves_total", "Leave requests"),
            &["result"],
        )?;
        registry.register(Box::new(leaves_total.clone()))?;

        let rejected_joins_total = IntCounterVec::new(
            Opts::new("lineup_rejected_joins_total", "Rejected join requests"),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_joins_total.clone()))?;

        Ok(Self {
            queue_size,
            joins_total,
            leaves_total,
            rejected_joins_total,
        })
    }
}

impl MatchingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let passes_total = IntCounterVec::new(
            Opts::new("lineup_matching_passes_total", "Matching passes by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(passes_total.clone()))?;

        let pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "lineup_matching_pass_duration_seconds",
                "Matching pass duration",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(pass_duration.clone()))?;

        let matches_formed_total =
            IntCounter::new("lineup_matches_total", "Total matches formed")?;
        registry.register(Box::new(matches_formed_total.clone()))?;

        let players_matched_total =
            IntCounter::new("lineup_players_matched_total", "Total players matched")?;
        registry.register(Box::new(players_matched_total.clone()))?;

        let commit_failures_total = IntCounterVec::new(
            Opts::new("lineup_commit_failures_total", "Failed match commits"),
            &["reason"],
        )?;
        registry.register(Box::new(commit_failures_total.clone()))?;

        let match_band = Histogram::with_opts(
            HistogramOpts::new(
                "lineup_match_band",
                "Rating tolerance in force when a match filled",
            )
            .buckets(vec![50.0, 75.0, 112.5, 168.75, 253.125, 500.0]),
        )?;
        registry.register(Box::new(match_band.clone()))?;

        Ok(Self {
            passes_total,
            pass_duration,
            matches_formed_total,
            players_matched_total,
            commit_failures_total,
            match_band,
        })
    }
}

impl NotificationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let subscribers = IntGauge::new("lineup_subscribers", "Connected notification subscribers")?;
        registry.register(Box::new(subscribers.clone()))?;

        let published_total = IntCounter::new(
            "lineup_notifications_published_total",
            "Events handed to the notification hub",
        )?;
        registry.register(Box::new(published_total.clone()))?;

        let dropped_total = IntCounterVec::new(
            Opts::new(
                "lineup_notifications_dropped_total",
                "Notification deliveries dropped",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(dropped_total.clone()))?;

        Ok(Self {
            subscribers,
            published_total,
            dropped_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    fn render(collector: &MetricsCollector) -> String {
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_collectors_do_not_share_registries() {
        let first = MetricsCollector::new().expect("Failed to create metrics collector");
        let second = MetricsCollector::new().expect("Failed to create metrics collector");

        first.record_join();
        assert_eq!(first.queue().joins_total.get(), 1);
        assert_eq!(second.queue().joins_total.get(), 0);
    }

    #[test]
    fn test_match_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_match(10, 112.5);
        collector.record_match(10, 50.0);
        collector.record_pass(pass_outcome::MATCHED, Duration::from_micros(300));

        assert_eq!(collector.matching().matches_formed_total.get(), 2);
        assert_eq!(collector.matching().players_matched_total.get(), 20);
        assert_eq!(
            collector
                .matching()
                .passes_total
                .with_label_values(&[pass_outcome::MATCHED])
                .get(),
            1
        );
        assert_eq!(collector.matching().match_band.get_sample_count(), 2);
    }

    #[test]
    fn test_queue_and_notification_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.set_queue_size(42);
        collector.record_leave(true);
        collector.record_leave(false);
        collector.record_rejected_join("invalid");
        collector.record_notification_dropped("subscriber_full", 3);
        collector.set_subscribers(2);

        assert_eq!(collector.queue().queue_size.get(), 42);
        assert_eq!(
            collector
                .notifications()
                .dropped_total
                .with_label_values(&["subscriber_full"])
                .get(),
            3
        );

        let text = render(&collector);
        assert!(text.contains("lineup_queue_size 42"));
        assert!(text.contains("lineup_subscribers 2"));
        assert!(text.contains("lineup_leaves_total{result=\"not_queued\"} 1"));
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("scheduler", true);
        collector.update_component_health("notification_hub", false);

        assert_eq!(collector.service().health_status.get(), 2);
        assert_eq!(
            collector
                .service()
                .component_health
                .with_label_values(&["notification_hub"])
                .get(),
            0
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();
        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}

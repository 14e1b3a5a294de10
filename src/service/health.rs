//! Health check reporting
//!
//! This module aggregates component checks for the lineup service: the
//! scheduler loop, the queue store and the notification hub.

use crate::api::ApiState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `lineup_health_status`
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.as_gauge() < self.as_gauge() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub players_waiting: usize,
    pub subscribers: usize,
    pub matches_formed: u64,
    pub players_matched: u64,
}

impl HealthCheck {
    /// Check every component and roll the results up
    ///
    /// A stopped scheduler or an unreachable store makes the service
    /// unhealthy. A stopped hub only degrades it, since players can still be
    /// queued and matched.
    pub async fn check(state: &ApiState) -> Self {
        let mut stats = ServiceStats {
            matches_formed: state.metrics.matching().matches_formed_total.get(),
            players_matched: state.metrics.matching().players_matched_total.get(),
            ..ServiceStats::default()
        };

        let scheduler = Self::check_scheduler(state);
        let store = Self::check_store(state, &mut stats).await;
        let hub = Self::check_hub(state, &mut stats).await;

        let status = scheduler
            .status
            .worst(store.status)
            .worst(hub.status);

        for check in [&scheduler, &store, &hub] {
            state
                .metrics
                .update_component_health(&check.name, check.status == HealthStatus::Healthy);
        }
        state.metrics.update_health_status(status.as_gauge());

        HealthCheck {
            status,
            service: state.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks: vec![scheduler, store, hub],
            stats,
        }
    }

    fn check_scheduler(state: &ApiState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if state.scheduler_running.load(Ordering::SeqCst) {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Match scheduler is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "scheduler".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_store(state: &ApiState, stats: &mut ServiceStats) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match state.store.queue_size().await {
            Ok(size) => {
                stats.players_waiting = size;
                (HealthStatus::Healthy, None)
            }
            Err(e) => {
                debug!("Queue store health check failed: {:#}", e);
                (HealthStatus::Unhealthy, Some(format!("{:#}", e)))
            }
        };

        ComponentCheck {
            name: "queue_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_hub(state: &ApiState, stats: &mut ServiceStats) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match state.hub.subscriber_count().await {
            Ok(count) => {
                stats.subscribers = count;
                (HealthStatus::Healthy, None)
            }
            Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
        };

        ComponentCheck {
            name: "notification_hub".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

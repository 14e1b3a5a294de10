//! Main application state and service coordination
//!
//! AppState wires the queue store, notification hub, matching engine and API
//! server together, owns their background tasks, and tears them down in
//! order: scheduler first (its current pass completes), then the HTTP server,
//! then the hub.

use crate::api::{ApiServer, ApiServerConfig, ApiState};
use crate::config::AppConfig;
use crate::matching::{MatchScheduler, MatchingEngine};
use crate::metrics::MetricsCollector;
use crate::notify::{HubConfig, NotificationHub};
use crate::queue::{InMemoryQueueStore, QueueStore};
use crate::service::health::HealthCheck;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval of the health metrics refresh task
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Service startup error: {message}")]
    Startup { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    store: Arc<dyn QueueStore>,
    metrics: Arc<MetricsCollector>,
    hub: NotificationHub,
    api_server: ApiServer,

    /// Taken by `start`
    scheduler: Option<MatchScheduler>,
    scheduler_running: Arc<AtomicBool>,

    scheduler_cancel: CancellationToken,
    hub_cancel: CancellationToken,
    tasks_cancel: CancellationToken,

    scheduler_task: Option<JoinHandle<()>>,
    api_task: Option<JoinHandle<()>>,
    hub_task: Option<JoinHandle<()>>,
    background_tasks: Vec<JoinHandle<()>>,

    local_addr: Option<SocketAddr>,
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with the in-memory queue store
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_store(config, Arc::new(InMemoryQueueStore::new())).await
    }

    /// Initialize the application around an existing queue store
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn QueueStore>,
    ) -> Result<Self, ServiceError> {
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        info!("Initializing {} matchmaking service", config.service.name);
        info!(
            "Configuration: group_size={}, candidate_limit={}, tick={}ms, reservations={}",
            config.matchmaking.group_size,
            config.matchmaking.candidate_limit,
            config.matchmaking.tick_interval_ms,
            config.matchmaking.reservation_policy
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let hub_cancel = CancellationToken::new();
        let (hub, hub_task) = NotificationHub::spawn(
            HubConfig {
                inbox_capacity: config.notifications.inbox_capacity,
                subscriber_buffer: config.notifications.subscriber_buffer,
            },
            metrics.clone(),
            hub_cancel.clone(),
        );

        let engine = Arc::new(MatchingEngine::new(
            store.clone(),
            Arc::new(hub.clone()),
            config.grouping(),
            config.matchmaking.candidate_limit,
            metrics.clone(),
        ));

        let scheduler = MatchScheduler::new(engine, config.tick_interval());
        let scheduler_running = scheduler.running_flag();

        let api_state = ApiState {
            service_name: config.service.name.clone(),
            store: store.clone(),
            hub: hub.clone(),
            metrics: metrics.clone(),
            scheduler_running: scheduler_running.clone(),
        };
        let api_server = ApiServer::new(
            ApiServerConfig {
                host: config.service.http_host.clone(),
                port: config.service.http_port,
            },
            api_state,
        );

        Ok(Self {
            config,
            store,
            metrics,
            hub,
            api_server,
            scheduler: Some(scheduler),
            scheduler_running,
            scheduler_cancel: CancellationToken::new(),
            hub_cancel,
            tasks_cancel: CancellationToken::new(),
            scheduler_task: None,
            api_task: None,
            hub_task: Some(hub_task),
            background_tasks: Vec::new(),
            local_addr: None,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the HTTP server, the match scheduler and the maintenance tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} matchmaking service", self.config.service.name);

        if self.scheduler.is_none() {
            return Err(ServiceError::Startup {
                message: "Service was already started".to_string(),
            });
        }

        self.start_api_server().await?;

        if let Some(scheduler) = self.scheduler.take() {
            self.scheduler_task = Some(tokio::spawn(scheduler.run(self.scheduler_cancel.clone())));
        }
        *self.is_running.write().await = true;

        self.start_background_tasks();

        info!("✅ {} matchmaking service started", self.config.service.name);
        Ok(())
    }

    async fn start_api_server(&mut self) -> Result<(), ServiceError> {
        let listener = self
            .api_server
            .bind()
            .await
            .map_err(|e| ServiceError::Startup {
                message: format!("{:#}", e),
            })?;
        self.local_addr = listener.local_addr().ok();

        let serving = self.api_server.serve(listener);
        self.api_task = Some(tokio::spawn(async move {
            if let Err(e) = serving.await {
                error!("API server failed: {:#}", e);
            }
        }));

        Ok(())
    }

    fn start_background_tasks(&mut self) {
        let health_metrics_task = {
            let state = self.api_state();
            let cancel = self.tasks_cancel.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);
                debug!("Health metrics task started");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {}
                    }

                    state.metrics.update_uptime();
                    let health = HealthCheck::check(&state).await;
                    debug!(
                        "Health: {} - {} waiting, {} subscriber(s), {} match(es) formed",
                        health.status,
                        health.stats.players_waiting,
                        health.stats.subscribers,
                        health.stats.matches_formed
                    );
                }

                debug!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(health_metrics_task);
        info!(
            "{} background maintenance task(s) started",
            self.background_tasks.len()
        );
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        *self.is_running.write().await = false;

        // The scheduler finishes its current pass before exiting
        self.scheduler_cancel.cancel();
        if let Some(task) = self.scheduler_task.take() {
            task.await.map_err(|e| ServiceError::BackgroundTask {
                message: format!("Match scheduler task failed: {}", e),
            })?;
            info!("✅ Match scheduler stopped");
        }

        self.api_server.stop();
        if let Some(task) = self.api_task.take() {
            if let Err(e) = task.await {
                warn!("API server task ended abnormally: {}", e);
            } else {
                info!("✅ API server stopped");
            }
        }

        self.tasks_cancel.cancel();
        for task in self.background_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        self.hub_cancel.cancel();
        if let Some(task) = self.hub_task.take() {
            if let Err(e) = task.await {
                warn!("Notification hub task ended abnormally: {}", e);
            } else {
                info!("✅ Notification hub stopped");
            }
        }

        match self.store.queue_size().await {
            Ok(waiting) => info!(
                "Final statistics: {} match(es) formed, {} player(s) matched, {} still waiting",
                self.metrics.matching().matches_formed_total.get(),
                self.metrics.matching().players_matched_total.get(),
                waiting
            ),
            Err(e) => warn!("Could not read final queue size: {:#}", e),
        }

        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn hub(&self) -> NotificationHub {
        self.hub.clone()
    }

    /// Address the HTTP server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// State shared with the HTTP handlers and health checks
    pub fn api_state(&self) -> ApiState {
        ApiState {
            service_name: self.config.service.name.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            scheduler_running: self.scheduler_running.clone(),
        }
    }
}

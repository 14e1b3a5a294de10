//! HTTP server for the lineup service
//!
//! One axum router serves player ingress, the subscriber WebSocket, health
//! checks and Prometheus metrics.

use crate::api::handlers;
use crate::metrics::MetricsCollector;
use crate::notify::NotificationHub;
use crate::queue::QueueStore;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
    /// Port to bind to, 0 picks a free one
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Shared state for every handler
#[derive(Clone)]
pub struct ApiState {
    pub service_name: String,
    pub store: Arc<dyn QueueStore>,
    pub hub: NotificationHub,
    pub metrics: Arc<MetricsCollector>,
    /// Set while the match scheduler loop is alive
    pub scheduler_running: Arc<AtomicBool>,
}

/// HTTP server with broadcast-driven graceful shutdown
pub struct ApiServer {
    config: ApiServerConfig,
    state: ApiState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: ApiState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Build the router with every endpoint
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::root_handler))
            .route("/join", post(handlers::join_handler))
            .route("/leave", post(handlers::leave_handler))
            .route("/ws", get(handlers::ws_handler))
            .route("/healthz", get(handlers::healthz_handler))
            .route("/health", get(handlers::health_handler))
            .route("/metrics", get(handlers::metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid API server address")?;

        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))
    }

    /// Serve on an already bound listener until `stop` is called
    ///
    /// The shutdown subscription is taken before the future is returned, so a
    /// `stop` issued after this call is never missed.
    pub fn serve(&self, listener: TcpListener) -> impl Future<Output = Result<()>> + Send + 'static {
        let app = self.router();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        async move {
            if let Ok(addr) = listener.local_addr() {
                info!("API server listening on http://{}", addr);
            }

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                    info!("API server shutdown signal received");
                })
                .await
                .context("API server failed")?;

            info!("API server stopped");
            Ok(())
        }
    }

    /// Signal the server to stop accepting connections
    pub fn stop(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("API server was not running when stop was requested");
        }
    }
}

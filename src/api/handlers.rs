//! HTTP handlers for ingress, subscribers, health and metrics

use crate::api::server::ApiState;
use crate::error::MatchmakingError;
use crate::notify::NotificationHub;
use crate::queue::validate_join_request;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{JoinRequest, LeaveRequest};
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::StreamExt;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::{debug, error, warn};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Root endpoint - shows service information
pub async fn root_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/join", "/leave", "/ws", "/healthz", "/health", "/metrics"]
    }))
}

/// `POST /join`
pub async fn join_handler(
    State(state): State<ApiState>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            state.metrics.record_rejected_join("malformed");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    if let Err(e) = validate_join_request(&request) {
        state.metrics.record_rejected_join("invalid");
        debug!("Rejected join for '{}': {}", request.player_id, e);
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.store.enqueue(request).await {
        Ok(player) => {
            state.metrics.record_join();
            debug!("Player '{}' queued at {:.1}", player.id, player.rating);
            Json(json!({
                "enqueued": true,
                "player_id": player.id,
                "at": player.joined_at,
            }))
            .into_response()
        }
        Err(e) => {
            state.metrics.record_rejected_join("storage");
            error!("Failed to enqueue player: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// `POST /leave`
pub async fn leave_handler(
    State(state): State<ApiState>,
    payload: Result<Json<LeaveRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    if request.player_id.trim().is_empty() {
        let e = MatchmakingError::InvalidJoinRequest {
            reason: "missing player_id".to_string(),
        };
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.store.dequeue(&request.player_id).await {
        Ok(removed) => {
            state.metrics.record_leave(removed);
            debug!("Leave for '{}' (removed: {})", request.player_id, removed);
            Json(json!({ "removed": removed })).into_response()
        }
        Err(e) => {
            error!("Failed to dequeue '{}': {:#}", request.player_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// `GET /ws` - every formed match is pushed as one JSON text frame
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(mut socket: WebSocket, hub: NotificationHub) {
    let mut subscription = match hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Refusing subscriber: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let id = subscription.id();
    debug!("Subscriber {} connected", id);

    loop {
        tokio::select! {
            payload = subscription.recv() => match payload {
                Some(payload) => {
                    if socket.send(Message::text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Hub shut down
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients have nothing to say; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    if let Err(e) = hub.unsubscribe(id).await {
        debug!("Could not unsubscribe {}: {}", id, e);
    }
    debug!("Subscriber {} disconnected", id);
}

/// `GET /healthz` - liveness only
pub async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

/// `GET /health` - component report
pub async fn health_handler(State(state): State<ApiState>) -> Response {
    let report = HealthCheck::check(&state).await;

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report)).into_response()
}

/// `GET /metrics` - Prometheus text format
pub async fn metrics_handler(State(state): State<ApiState>) -> Response {
    state.metrics.update_uptime();

    let metric_families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

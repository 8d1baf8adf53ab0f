//! HTTP handlers: the WebSocket upgrade plus health and metrics endpoints.

use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics::HealthStatus;
use crate::ws;

/// Upgrade to the relay WebSocket. Identity is claimed later by the
/// connection's identify event; the upgrade itself is unauthenticated.
pub async fn relay_websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    let metrics = state.metrics.clone();
    let send_queue_capacity = state.config.relay.send_queue_capacity;

    ws.on_upgrade(move |socket| ws::handle_relay_ws(socket, hub, metrics, send_queue_capacity))
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(HealthStatus {
        status: "healthy".to_string(),
        connections: snapshot.connections.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

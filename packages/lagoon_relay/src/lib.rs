//! Relay server for the Lagoon live-chat platform.
//!
//! Hosts the `/api/ws` publish/subscribe endpoint that pairs widget visitors
//! with their tenant's support agents. Everything durable lives behind the
//! separate REST API; this process only tracks who is connected and forwards
//! events one hop.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod ws;

use crate::config::FileConfig;
use crate::metrics::ServerMetrics;
use crate::ws::{ConnectionRegistry, RelayHub};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RelayHub>,
    pub metrics: Arc<ServerMetrics>,
    pub config: Arc<FileConfig>,
}

impl AppState {
    pub fn new(config: FileConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let hub = Arc::new(RelayHub::new(registry, metrics.clone()));
        Self {
            hub,
            metrics,
            config: Arc::new(config),
        }
    }
}

/// Assemble the relay router: the WebSocket route plus observability
/// endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ws", get(handlers::relay_websocket_handler))
        .route("/api/health", get(handlers::health_handler))
        .route("/api/health/live", get(handlers::health_live_handler))
        .route("/api/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! WebSocket Handler
//!
//! Per-connection plumbing: split the socket, drain an outbound queue into
//! it, dispatch inbound events to the relay hub, and clean up the registry
//! entry when the connection drops.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use lagoon_protocol::{ClientEvent, ServerEvent};

use crate::metrics::ServerMetrics;

use super::relay::RelayHub;

/// Handle one relay WebSocket connection from open to close.
pub async fn handle_relay_ws(
    socket: WebSocket,
    hub: Arc<RelayHub>,
    metrics: Arc<ServerMetrics>,
    send_queue_capacity: usize,
) {
    // Unique ID for this connection; identity comes later via identify.
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "WebSocket connection opened");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue: the relay pushes here, the sender task drains into the
    // socket. A full queue drops events rather than stalling the relay.
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(send_queue_capacity);
    hub.registry().connect(&connection_id, tx).await;

    let sender_task = async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let hub_input = hub.clone();
    let metrics_input = metrics.clone();
    let connection_id_input = connection_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            hub_input.handle_event(&connection_id_input, event).await;
                        }
                        Err(e) => {
                            // Fire-and-forget contract: nothing goes back to
                            // the sender.
                            debug!(conn_id = %connection_id_input, "unparseable event dropped: {}", e);
                            metrics_input.malformed_event();
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %connection_id_input, "client closed connection");
                    break;
                }
                Err(e) => {
                    debug!(conn_id = %connection_id_input, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %connection_id, "sender task ended"),
        _ = input_task => debug!(conn_id = %connection_id, "input task ended"),
    }

    // Synchronous cleanup: the registry entry must not outlive the
    // connection, and the tenant's agents hear about a departing visitor.
    hub.handle_disconnect(&connection_id).await;
    metrics.connection_closed();
    info!(conn_id = %connection_id, "WebSocket connection closed");
}

//! Server metrics for observability
//!
//! Runtime counters for the relay, exposed at `/api/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Relay metrics
    /// Client events received (any kind)
    pub events_received: AtomicU64,
    /// Events forwarded to a recipient connection
    pub events_relayed: AtomicU64,
    /// Message events whose recipient set was empty (counterpart offline)
    pub routing_misses: AtomicU64,
    /// Events dropped for a malformed payload or unidentified sender
    pub malformed_events: AtomicU64,
    /// Forwards dropped because a recipient's outbound queue was full
    pub events_dropped: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Instant,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            events_relayed: AtomicU64::new(0),
            routing_misses: AtomicU64::new(0),
            malformed_events: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_relayed(&self) {
        self.events_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routing_miss(&self) {
        self.routing_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_event(&self) {
        self.malformed_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            relay: RelayMetrics {
                events_received: self.events_received.load(Ordering::Relaxed),
                events_relayed: self.events_relayed.load(Ordering::Relaxed),
                routing_misses: self.routing_misses.load(Ordering::Relaxed),
                malformed_events: self.malformed_events.load(Ordering::Relaxed),
                events_dropped: self.events_dropped.load(Ordering::Relaxed),
            },
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of all counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections: ConnectionMetrics,
    pub relay: RelayMetrics,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMetrics {
    pub events_received: u64,
    pub events_relayed: u64,
    pub routing_misses: u64,
    pub malformed_events: u64,
    pub events_dropped: u64,
}

/// Health summary returned by `/api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub uptime_secs: u64,
}

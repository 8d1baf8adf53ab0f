//! Real-Time Relay
//!
//! The presence and fan-out core: one registry entry per live connection,
//! visitor events broadcast to the tenant's agent pool, agent events routed
//! to the single visitor connection of the named conversation. Best-effort
//! only: the REST write path is the durable record.

mod handler;
mod presence;
mod registry;
mod relay;

pub use handler::handle_relay_ws;
pub use presence::{Route, recipients, resolve_route};
pub use registry::ConnectionRegistry;
pub use relay::RelayHub;

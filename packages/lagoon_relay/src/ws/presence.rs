//! Presence Resolver
//!
//! Computes which connections receive a forwarded event: a visitor's events
//! fan out to every agent connection under its tenant key, an agent's events
//! go to the single visitor connection of the conversation named in the
//! payload. The sender itself is never a recipient.

use lagoon_protocol::Identity;

use super::registry::ConnectionRegistry;

/// Where a forwarded event should go, derived from the sender's identity
/// and the routing key carried in the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Tenant-wide broadcast to every agent dashboard connection.
    TenantAgents { tenant_key: String },
    /// Direct send to the conversation's visitor connection.
    ConversationVisitor { conversation_id: String },
}

/// Derive the route for a message-style event.
///
/// A visitor is routed by its registered tenant key; the payload's recipient
/// key is not trusted over the registry. An agent is not scoped to one
/// conversation, so its route comes from the payload's recipient key (the
/// conversation id). Returns `None` for a malformed event: an agent event
/// with no conversation id has nowhere to go and is dropped upstream.
pub fn resolve_route(sender: &Identity, recipient_key: &str) -> Option<Route> {
    match sender {
        Identity::Visitor { tenant_key, .. } => Some(Route::TenantAgents {
            tenant_key: tenant_key.clone(),
        }),
        Identity::Agent { .. } => {
            if recipient_key.is_empty() {
                return None;
            }
            Some(Route::ConversationVisitor {
                conversation_id: recipient_key.to_string(),
            })
        }
    }
}

/// Resolve a route to concrete connection ids, excluding the sender.
///
/// An empty result is a routing miss, not an error: the counterpart is
/// offline and will catch up from the durable store.
pub async fn recipients(
    registry: &ConnectionRegistry,
    sender_connection_id: &str,
    route: &Route,
) -> Vec<String> {
    let mut targets = match route {
        Route::TenantAgents { tenant_key } => registry.agent_connections(tenant_key).await,
        Route::ConversationVisitor { conversation_id } => registry
            .visitor_connection(conversation_id)
            .await
            .into_iter()
            .collect(),
    };
    targets.retain(|conn_id| conn_id != sender_connection_id);
    targets
}

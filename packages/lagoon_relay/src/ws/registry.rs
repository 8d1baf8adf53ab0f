//! Connection Registry
//!
//! Tracks which live WebSocket connection belongs to which identity, the
//! reverse lookups the presence resolver needs, and the outbound channel for
//! each connection. The registry is process-local; presence is not shared
//! across relay instances.

use std::collections::{HashMap, HashSet};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use lagoon_protocol::{Identity, ServerEvent};

struct ConnectionEntry {
    identity: Option<Identity>,
    /// Sender half of the connection's outbound queue. Absent for entries
    /// created by `register` in tests that never attach a transport.
    sender: Option<mpsc::Sender<ServerEvent>>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<String, ConnectionEntry>,
    /// Tenant key -> agent connection ids (the tenant-wide room).
    agent_rooms: HashMap<String, HashSet<String>>,
    /// Conversation id -> the visitor connection, latest registration wins.
    visitor_index: HashMap<String, String>,
}

impl RegistryInner {
    /// Drop the reverse-index references a connection's identity holds.
    /// The visitor index is only cleared when it still points at this
    /// connection, so a reconnect that already displaced the entry is left
    /// intact.
    fn clear_indices(&mut self, connection_id: &str, identity: &Identity) {
        match identity {
            Identity::Agent { tenant_key } => {
                if let Some(room) = self.agent_rooms.get_mut(tenant_key) {
                    room.remove(connection_id);
                    if room.is_empty() {
                        self.agent_rooms.remove(tenant_key);
                    }
                }
            }
            Identity::Visitor {
                conversation_id, ..
            } => {
                if self
                    .visitor_index
                    .get(conversation_id)
                    .is_some_and(|owner| owner == connection_id)
                {
                    self.visitor_index.remove(conversation_id);
                }
            }
        }
    }
}

/// In-memory map from live connections to identities, with reverse lookups.
///
/// Owned behind an `Arc` and injected into the relay; all mutation happens
/// through a single lock, so each operation is one atomic map update.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Record a freshly opened transport connection and its outbound queue.
    /// The connection stays unidentified until its identify event arrives.
    pub async fn connect(&self, connection_id: &str, sender: mpsc::Sender<ServerEvent>) {
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                identity: None,
                sender: Some(sender),
            },
        );
    }

    /// Bind an identity to a connection. Idempotent per connection: a second
    /// identify overwrites the first, cleaning up the old reverse indices.
    /// Always succeeds.
    pub async fn register(&self, connection_id: &str, identity: Identity) {
        let mut inner = self.inner.write().await;

        let old = inner
            .connections
            .get_mut(connection_id)
            .and_then(|entry| entry.identity.take());
        if let Some(old) = old {
            inner.clear_indices(connection_id, &old);
        }

        match &identity {
            Identity::Agent { tenant_key } => {
                inner
                    .agent_rooms
                    .entry(tenant_key.clone())
                    .or_default()
                    .insert(connection_id.to_string());
            }
            Identity::Visitor {
                conversation_id, ..
            } => {
                // Latest wins: a reconnecting visitor displaces any stale
                // registration for the same conversation immediately.
                inner
                    .visitor_index
                    .insert(conversation_id.clone(), connection_id.to_string());
            }
        }

        let entry = inner
            .connections
            .entry(connection_id.to_string())
            .or_insert(ConnectionEntry {
                identity: None,
                sender: None,
            });
        entry.identity = Some(identity);
    }

    /// Remove a connection and its index references. Returns the identity it
    /// held, if any. No-op when the connection is unknown: a disconnect can
    /// race a connection that never identified.
    pub async fn unregister(&self, connection_id: &str) -> Option<Identity> {
        let mut inner = self.inner.write().await;
        let entry = inner.connections.remove(connection_id)?;
        if let Some(identity) = &entry.identity {
            inner.clear_indices(connection_id, identity);
        } else {
            debug!(conn_id = %connection_id, "unidentified connection removed");
        }
        entry.identity
    }

    pub async fn lookup(&self, connection_id: &str) -> Option<Identity> {
        self.inner
            .read()
            .await
            .connections
            .get(connection_id)
            .and_then(|e| e.identity.clone())
    }

    /// Every agent connection currently registered under a tenant key.
    pub async fn agent_connections(&self, tenant_key: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .agent_rooms
            .get(tenant_key)
            .map(|room| room.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The single live visitor connection for a conversation, if any. Stale
    /// duplicates from reconnect races never surface here: the index keeps
    /// only the most recent registration.
    pub async fn visitor_connection(&self, conversation_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .visitor_index
            .get(conversation_id)
            .cloned()
    }

    /// Conversation ids with a live visitor connection under a tenant.
    /// Feeds the `joined_conversations` reply on agent identify.
    pub async fn active_conversations(&self, tenant_key: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .visitor_index
            .iter()
            .filter(|(_, conn_id)| {
                inner
                    .connections
                    .get(*conn_id)
                    .and_then(|e| e.identity.as_ref())
                    .is_some_and(|id| !id.is_agent() && id.tenant_key() == tenant_key)
            })
            .map(|(conversation_id, _)| conversation_id.clone())
            .collect()
    }

    pub async fn sender_of(&self, connection_id: &str) -> Option<mpsc::Sender<ServerEvent>> {
        self.inner
            .read()
            .await
            .connections
            .get(connection_id)
            .and_then(|e| e.sender.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

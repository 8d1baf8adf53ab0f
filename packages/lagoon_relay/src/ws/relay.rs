//! Message Relay
//!
//! Binds inbound client events to presence-driven forwarding. Forwarding is
//! fire-and-forget: a miss (counterpart offline) or a full outbound queue
//! drops the event, and the durable REST record stays authoritative.

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use lagoon_protocol::{ClientEvent, Identity, ServerEvent};

use crate::metrics::ServerMetrics;

use super::presence::{Route, recipients, resolve_route};
use super::registry::ConnectionRegistry;

/// Event dispatcher for one relay process.
///
/// Holds the injected registry and metrics; one instance serves every
/// connection.
pub struct RelayHub {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
}

impl RelayHub {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<ServerMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Dispatch one inbound event from an identified-or-not connection.
    /// Never returns an error to the sender: these are fire-and-forget
    /// notifications, and the REST path owns correctness.
    pub async fn handle_event(&self, connection_id: &str, event: ClientEvent) {
        self.metrics.event_received();
        match event {
            ClientEvent::Identify {
                conversation_id,
                tenant_key,
            } => {
                self.handle_identify(connection_id, conversation_id, tenant_key)
                    .await;
            }
            ClientEvent::ConversationStarted {
                conversation,
                tenant_key,
            } => {
                let route = Route::TenantAgents { tenant_key };
                self.forward(
                    connection_id,
                    &route,
                    ServerEvent::ConversationStarted { conversation },
                )
                .await;
            }
            ClientEvent::MessageSent {
                message,
                recipient_key,
            } => {
                let Some(route) = self.message_route(connection_id, &recipient_key).await else {
                    return;
                };
                self.forward(connection_id, &route, ServerEvent::MessageReceived { message })
                    .await;
            }
            ClientEvent::MessageUpdateSent {
                message,
                correlation_id,
            } => {
                // Updates carry no recipient key; the confirmed message's
                // conversation id is the routing field for agent senders.
                let conversation_id = message.conversation_id.clone();
                let Some(route) = self.message_route(connection_id, &conversation_id).await else {
                    return;
                };
                self.forward(
                    connection_id,
                    &route,
                    ServerEvent::MessageUpdated {
                        message,
                        correlation_id,
                    },
                )
                .await;
            }
        }
    }

    /// Transport disconnect: remove the registry entry synchronously and,
    /// for visitors, tell the tenant's agents the conversation went dark.
    pub async fn handle_disconnect(&self, connection_id: &str) {
        match self.registry.unregister(connection_id).await {
            Some(Identity::Visitor {
                conversation_id,
                tenant_key,
            }) => {
                info!(conn_id = %connection_id, conversation = %conversation_id, "visitor disconnected");
                let route = Route::TenantAgents { tenant_key };
                self.forward(
                    connection_id,
                    &route,
                    ServerEvent::LeftConversation { conversation_id },
                )
                .await;
            }
            Some(Identity::Agent { tenant_key }) => {
                debug!(conn_id = %connection_id, tenant = %tenant_key, "agent disconnected");
            }
            None => {}
        }
    }

    async fn handle_identify(
        &self,
        connection_id: &str,
        conversation_id: String,
        tenant_key: Option<String>,
    ) {
        let identity = Identity::from_identify(conversation_id, tenant_key);
        self.registry.register(connection_id, identity.clone()).await;

        match identity {
            Identity::Agent { tenant_key } => {
                // The dashboard needs to know which conversations already
                // have a live visitor.
                let conversation_ids = self.registry.active_conversations(&tenant_key).await;
                info!(conn_id = %connection_id, tenant = %tenant_key, "agent identified");
                self.send_direct(
                    connection_id,
                    ServerEvent::JoinedConversations { conversation_ids },
                )
                .await;
            }
            Identity::Visitor {
                conversation_id,
                tenant_key,
            } => {
                info!(conn_id = %connection_id, conversation = %conversation_id, "visitor identified");
                let route = Route::TenantAgents { tenant_key };
                self.forward(
                    connection_id,
                    &route,
                    ServerEvent::JoinedConversation { conversation_id },
                )
                .await;
            }
        }
    }

    /// Routing for message/update events. Drops (with a malformed count)
    /// when the sender never identified or an agent event names no
    /// conversation.
    async fn message_route(&self, connection_id: &str, recipient_key: &str) -> Option<Route> {
        let Some(sender) = self.registry.lookup(connection_id).await else {
            debug!(conn_id = %connection_id, "dropping event from unidentified connection");
            self.metrics.malformed_event();
            return None;
        };
        match resolve_route(&sender, recipient_key) {
            Some(route) => Some(route),
            None => {
                debug!(conn_id = %connection_id, "dropping event with no routable recipient key");
                self.metrics.malformed_event();
                None
            }
        }
    }

    /// Fan the event out to every resolved recipient, never the sender.
    async fn forward(&self, sender_connection_id: &str, route: &Route, event: ServerEvent) {
        let targets = recipients(&self.registry, sender_connection_id, route).await;
        if targets.is_empty() {
            // Counterpart offline; it will see the change on its next fetch.
            self.metrics.routing_miss();
            debug!(conn_id = %sender_connection_id, ?route, "routing miss, event dropped");
            return;
        }
        for target in targets {
            self.send_direct(&target, event.clone()).await;
        }
    }

    async fn send_direct(&self, connection_id: &str, event: ServerEvent) {
        let Some(sender) = self.registry.sender_of(connection_id).await else {
            debug!(conn_id = %connection_id, "no outbound queue for recipient");
            return;
        };
        match sender.try_send(event) {
            Ok(()) => self.metrics.event_relayed(),
            Err(TrySendError::Full(_)) => {
                self.metrics.event_dropped();
                warn!(conn_id = %connection_id, "outbound queue full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %connection_id, "outbound queue closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagoon_protocol::{ContentType, Message, MessageKind};
    use tokio::sync::mpsc;

    fn hub() -> RelayHub {
        RelayHub::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(ServerMetrics::new()),
        )
    }

    async fn open(hub: &RelayHub, conn_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(16);
        hub.registry().connect(conn_id, tx).await;
        rx
    }

    fn message(id: &str, content: &str, conversation_id: &str) -> Message {
        Message {
            id: id.to_string(),
            kind: MessageKind::Outbound,
            content: content.to_string(),
            content_type: ContentType::Text,
            seen: false,
            local: true,
            created_at: "2024-06-15T10:00:00Z".to_string(),
            conversation_id: conversation_id.to_string(),
        }
    }

    async fn identify_visitor(hub: &RelayHub, conn_id: &str, conversation: &str, tenant: &str) {
        hub.handle_event(
            conn_id,
            ClientEvent::Identify {
                conversation_id: conversation.to_string(),
                tenant_key: Some(tenant.to_string()),
            },
        )
        .await;
    }

    async fn identify_agent(hub: &RelayHub, conn_id: &str, tenant: &str) {
        hub.handle_event(
            conn_id,
            ClientEvent::Identify {
                conversation_id: tenant.to_string(),
                tenant_key: None,
            },
        )
        .await;
    }

    #[tokio::test]
    async fn visitor_message_reaches_tenant_agent() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let mut visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-1", "k1").await;
        // Drain the joined_conversations reply.
        assert!(matches!(
            agent_rx.recv().await,
            Some(ServerEvent::JoinedConversations { .. })
        ));

        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        assert!(matches!(
            agent_rx.recv().await,
            Some(ServerEvent::JoinedConversation { conversation_id }) if conversation_id == "c1"
        ));

        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageSent {
                message: message("171234", "hi", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;

        match agent_rx.recv().await {
            Some(ServerEvent::MessageReceived { message }) => {
                assert_eq!(message.content, "hi");
                assert_eq!(message.conversation_id, "c1");
            }
            other => panic!("expected MessageReceived, got {:?}", other),
        }
        // No echo back to the visitor.
        assert!(visitor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn two_agents_each_receive_one_copy() {
        let hub = hub();
        let mut agent_a = open(&hub, "agent-a").await;
        let mut agent_b = open(&hub, "agent-b").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-a", "k1").await;
        identify_agent(&hub, "agent-b", "k1").await;
        agent_a.recv().await;
        agent_b.recv().await;

        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_a.recv().await;
        agent_b.recv().await;

        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageSent {
                message: message("171234", "hello", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;

        for rx in [&mut agent_a, &mut agent_b] {
            assert!(matches!(
                rx.recv().await,
                Some(ServerEvent::MessageReceived { .. })
            ));
            assert!(rx.try_recv().is_err(), "exactly one copy per connection");
        }
    }

    #[tokio::test]
    async fn tenant_isolation_holds() {
        let hub = hub();
        let mut agent_k1 = open(&hub, "agent-k1").await;
        let mut agent_k2 = open(&hub, "agent-k2").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-k1", "k1").await;
        identify_agent(&hub, "agent-k2", "k2").await;
        agent_k1.recv().await;
        agent_k2.recv().await;

        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_k1.recv().await;

        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageSent {
                message: message("171234", "hi", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;

        assert!(matches!(
            agent_k1.recv().await,
            Some(ServerEvent::MessageReceived { .. })
        ));
        assert!(agent_k2.try_recv().is_err());
    }

    #[tokio::test]
    async fn agent_message_reaches_single_visitor() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let mut visitor_old = open(&hub, "visitor-old").await;
        let mut visitor_new = open(&hub, "visitor-new").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;
        // Reconnect race: stale registration still present.
        identify_visitor(&hub, "visitor-old", "c1", "k1").await;
        agent_rx.recv().await;
        identify_visitor(&hub, "visitor-new", "c1", "k1").await;
        agent_rx.recv().await;

        let mut msg = message("m1", "hello there", "c1");
        msg.kind = MessageKind::Inbound;
        msg.local = false;
        hub.handle_event(
            "agent-1",
            ClientEvent::MessageSent {
                message: msg,
                recipient_key: "c1".to_string(),
            },
        )
        .await;

        assert!(matches!(
            visitor_new.recv().await,
            Some(ServerEvent::MessageReceived { .. })
        ));
        assert!(visitor_old.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_to_empty_tenant_room_is_dropped_quietly() {
        let hub = hub();
        let _visitor_rx = open(&hub, "visitor-1").await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;

        // No agents registered under k1: silent drop, no panic.
        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageSent {
                message: message("171234", "anyone?", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;
    }

    #[tokio::test]
    async fn agent_disconnect_then_visitor_message_drops_quietly() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_rx.recv().await;

        hub.handle_disconnect("agent-1").await;
        assert!(hub.registry().lookup("agent-1").await.is_none());

        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageSent {
                message: message("171234", "hi", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;
        // Nothing to assert beyond "no panic": the event had zero recipients.
    }

    #[tokio::test]
    async fn visitor_disconnect_notifies_tenant_agents() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_rx.recv().await;

        hub.handle_disconnect("visitor-1").await;
        assert!(matches!(
            agent_rx.recv().await,
            Some(ServerEvent::LeftConversation { conversation_id }) if conversation_id == "c1"
        ));
    }

    #[tokio::test]
    async fn update_event_is_forwarded_with_correlation_id() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_rx.recv().await;

        let mut confirmed = message("m9", "hi", "c1");
        confirmed.local = false;
        hub.handle_event(
            "visitor-1",
            ClientEvent::MessageUpdateSent {
                message: confirmed,
                correlation_id: "171234".to_string(),
            },
        )
        .await;

        match agent_rx.recv().await {
            Some(ServerEvent::MessageUpdated {
                message,
                correlation_id,
            }) => {
                assert_eq!(message.id, "m9");
                assert_eq!(correlation_id, "171234");
            }
            other => panic!("expected MessageUpdated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unidentified_sender_is_dropped() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let _stranger_rx = open(&hub, "stranger").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;

        hub.handle_event(
            "stranger",
            ClientEvent::MessageSent {
                message: message("171234", "hi", "c1"),
                recipient_key: "k1".to_string(),
            },
        )
        .await;
        assert!(agent_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn conversation_started_broadcasts_to_tenant() {
        let hub = hub();
        let mut agent_rx = open(&hub, "agent-1").await;
        let _visitor_rx = open(&hub, "visitor-1").await;

        identify_agent(&hub, "agent-1", "k1").await;
        agent_rx.recv().await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;
        agent_rx.recv().await;

        hub.handle_event(
            "visitor-1",
            ClientEvent::ConversationStarted {
                conversation: lagoon_protocol::ConversationSummary {
                    id: "c1".to_string(),
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    created_at: "2024-06-15T10:00:00Z".to_string(),
                },
                tenant_key: "k1".to_string(),
            },
        )
        .await;

        assert!(matches!(
            agent_rx.recv().await,
            Some(ServerEvent::ConversationStarted { conversation }) if conversation.id == "c1"
        ));
    }

    #[tokio::test]
    async fn agent_identify_returns_active_conversations() {
        let hub = hub();
        let _visitor_rx = open(&hub, "visitor-1").await;
        identify_visitor(&hub, "visitor-1", "c1", "k1").await;

        let mut agent_rx = open(&hub, "agent-1").await;
        identify_agent(&hub, "agent-1", "k1").await;

        match agent_rx.recv().await {
            Some(ServerEvent::JoinedConversations { conversation_ids }) => {
                assert_eq!(conversation_ids, vec!["c1".to_string()]);
            }
            other => panic!("expected JoinedConversations, got {:?}", other),
        }
    }
}

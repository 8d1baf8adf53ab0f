//! Wire Protocol Types
//!
//! The shared contract between the relay server and the front-end cores:
//! domain payloads relayed verbatim, participant identity, and the tagged
//! JSON event enums flowing over the WebSocket in each direction.

use serde::{Deserialize, Serialize};

/// Direction of a message relative to the support desk.
/// `Inbound` is written by an agent, `Outbound` by the widget visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Inbound,
    Outbound,
}

/// Payload classification of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Image,
    File,
    Video,
    Audio,
}

/// A chat message as it travels through the relay.
///
/// The relay never interprets anything here beyond `conversation_id`; the
/// rest is an opaque payload owned by the durable store. While a message is
/// optimistic (`local == true`) its `id` holds the client-generated
/// correlation id rather than a persisted id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub content_type: ContentType,
    pub seen: bool,
    #[serde(default)]
    pub local: bool,
    /// RFC 3339 creation timestamp (server-assigned once persisted).
    pub created_at: String,
    pub conversation_id: String,
}

/// Summary of a conversation, broadcast to agent dashboards when a visitor
/// opens a new thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

/// Metadata returned by the object store after an attachment upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub id: i64,
    /// Public URL of the stored object.
    pub location: String,
}

/// Who owns a live connection.
///
/// An agent is tenant-scoped: one dashboard connection serves every
/// conversation under its tenant key, and an agent may hold several
/// connections at once (tabs, devices). A visitor is scoped to exactly one
/// conversation and carries the tenant key that locates its agent pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Identity {
    Agent {
        tenant_key: String,
    },
    Visitor {
        conversation_id: String,
        tenant_key: String,
    },
}

impl Identity {
    /// Interpret the two-field identify payload.
    ///
    /// A connection that supplies a tenant key is a visitor under that
    /// tenant; one that does not is an agent whose first field *is* its
    /// tenant key.
    pub fn from_identify(conversation_id: String, tenant_key: Option<String>) -> Self {
        match tenant_key {
            Some(tenant_key) => Identity::Visitor {
                conversation_id,
                tenant_key,
            },
            None => Identity::Agent {
                tenant_key: conversation_id,
            },
        }
    }

    pub fn tenant_key(&self) -> &str {
        match self {
            Identity::Agent { tenant_key } => tenant_key,
            Identity::Visitor { tenant_key, .. } => tenant_key,
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Identity::Agent { .. })
    }
}

/// Events sent FROM a client TO the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First event on every connection: declare who this connection is.
    /// Agents send their tenant key as `conversation_id` and omit
    /// `tenant_key`; visitors send both.
    Identify {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        #[serde(
            rename = "tenantKey",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        tenant_key: Option<String>,
    },
    /// A visitor opened a new conversation; notify the tenant's agents.
    ConversationStarted {
        conversation: ConversationSummary,
        #[serde(rename = "tenantKey")]
        tenant_key: String,
    },
    /// A message was sent (optimistic copy, emitted before the durable
    /// write). `recipient_key` is the tenant key for visitor senders and
    /// the conversation id for agent senders.
    MessageSent {
        message: Message,
        #[serde(rename = "recipientKey")]
        recipient_key: String,
    },
    /// The durable write succeeded; carry the confirmed message plus the
    /// correlation id of the optimistic entry it supersedes.
    MessageUpdateSent {
        message: Message,
        #[serde(rename = "correlationId")]
        correlation_id: String,
    },
}

/// Events sent FROM the relay TO a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Relayed counterpart of `MessageSent`.
    MessageReceived { message: Message },
    /// Relayed counterpart of `MessageUpdateSent`.
    MessageUpdated {
        message: Message,
        #[serde(rename = "correlationId")]
        correlation_id: String,
    },
    /// A new conversation opened under the recipient agent's tenant.
    ConversationStarted { conversation: ConversationSummary },
    /// A visitor connected for this conversation.
    JoinedConversation {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    /// A visitor's connection dropped.
    LeftConversation {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    /// Reply to an agent identify: every conversation with a live visitor
    /// connection under the agent's tenant.
    JoinedConversations {
        #[serde(rename = "conversationIds")]
        conversation_ids: Vec<String>,
    },
}

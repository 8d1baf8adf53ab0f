//! Chat Session
//!
//! The stateful core a front-end embeds: it owns the local message list,
//! runs the optimistic dual-write protocol for outgoing messages, and merges
//! relayed events from the counterpart. One instance per open conversation
//! view (widget) or per dashboard (agent).

use chrono::Utc;
use tracing::{debug, warn};

use lagoon_protocol::{ClientEvent, ContentType, Message, MessageKind, ServerEvent};

use crate::api::{
    ApiError, DurableStore, EventSink, FileUpload, NewConversation, NewMessage, ObjectStorage,
};
use crate::outbox::{ChatEvent, ChatState, apply};

/// Which end of a conversation this session is.
#[derive(Debug, Clone)]
pub enum Role {
    /// The widget end: messages go out as `OUTBOUND`, addressed to the
    /// tenant's agent pool.
    Visitor { tenant_key: String },
    /// The support dashboard end: messages go out as `INBOUND`, addressed
    /// to the conversation's visitor connection.
    Agent { tenant_key: String },
}

impl Role {
    fn message_kind(&self) -> MessageKind {
        match self {
            Role::Visitor { .. } => MessageKind::Outbound,
            Role::Agent { .. } => MessageKind::Inbound,
        }
    }

    fn recipient_key(&self, conversation_id: &str) -> String {
        match self {
            Role::Visitor { tenant_key } => tenant_key.clone(),
            Role::Agent { .. } => conversation_id.to_string(),
        }
    }

    fn tenant_key(&self) -> &str {
        match self {
            Role::Visitor { tenant_key } | Role::Agent { tenant_key } => tenant_key,
        }
    }
}

pub struct ChatSession<S, O, E> {
    role: Role,
    conversation_id: String,
    store: S,
    storage: O,
    sink: E,
    state: ChatState,
    /// Conversations with a live visitor connection (dashboard bookkeeping,
    /// fed by the relay's presence notices).
    active_conversations: Vec<String>,
    /// Last issued correlation id, kept to guarantee uniqueness when two
    /// sends land in the same millisecond.
    last_correlation_ms: i64,
}

impl<S, O, E> ChatSession<S, O, E>
where
    S: DurableStore,
    O: ObjectStorage,
    E: EventSink,
{
    pub fn new(role: Role, conversation_id: impl Into<String>, store: S, storage: O, sink: E) -> Self {
        Self {
            role,
            conversation_id: conversation_id.into(),
            store,
            storage,
            sink,
            state: ChatState::default(),
            active_conversations: Vec::new(),
            last_correlation_ms: 0,
        }
    }

    /// Local message list, newest first.
    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_conversation_active(&self, conversation_id: &str) -> bool {
        self.active_conversations
            .iter()
            .any(|id| id == conversation_id)
    }

    /// Announce this connection's identity to the relay. Agents send their
    /// tenant key alone; visitors send conversation id plus tenant key.
    pub fn identify(&self) {
        let event = match &self.role {
            Role::Agent { tenant_key } => ClientEvent::Identify {
                conversation_id: tenant_key.clone(),
                tenant_key: None,
            },
            Role::Visitor { tenant_key } => ClientEvent::Identify {
                conversation_id: self.conversation_id.clone(),
                tenant_key: Some(tenant_key.clone()),
            },
        };
        self.sink.emit(event);
    }

    /// Switch the dashboard to another conversation; the transcript must be
    /// reloaded before the list is meaningful again.
    pub fn set_conversation(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = conversation_id.into();
        self.state = ChatState::default();
    }

    /// Replace local state with the durable transcript. Used on page load
    /// and after a reconnect: there is no relay-side replay, the store is
    /// the record.
    pub async fn load_transcript(&mut self) -> Result<(), ApiError> {
        let transcript = self
            .store
            .fetch_conversation(self.conversation_id.clone())
            .await?;
        self.state = ChatState {
            messages: transcript.messages,
        };
        Ok(())
    }

    /// Open a new conversation from the widget: persist it, identify under
    /// it, and tell the tenant's agents it exists.
    pub async fn start_conversation(
        &mut self,
        name: &str,
        email: &str,
    ) -> Result<lagoon_protocol::ConversationSummary, ApiError> {
        let Role::Visitor { tenant_key } = &self.role else {
            return Err(ApiError::Unsupported(
                "only a visitor session can start a conversation".to_string(),
            ));
        };
        let tenant_key = tenant_key.clone();

        let conversation = self
            .store
            .create_conversation(NewConversation {
                name: name.to_string(),
                email: email.to_string(),
                api_key: tenant_key.clone(),
            })
            .await?;

        self.conversation_id = conversation.id.clone();
        self.sink.emit(ClientEvent::Identify {
            conversation_id: conversation.id.clone(),
            tenant_key: Some(tenant_key.clone()),
        });
        self.sink.emit(ClientEvent::ConversationStarted {
            conversation: conversation.clone(),
            tenant_key,
        });
        Ok(conversation)
    }

    /// Send a message: optimistic insert and relay emit first, then the
    /// durable write (attachment upload included). On success the optimistic
    /// entry is replaced and the counterpart told to do the same; on failure
    /// it is rolled back and the error is the caller's to surface. No retry.
    pub async fn send_message(
        &mut self,
        content: &str,
        attachment: Option<FileUpload>,
    ) -> Result<Message, ApiError> {
        let correlation_id = self.next_correlation_id();
        let content_type = attachment
            .as_ref()
            .map(FileUpload::content_type)
            .unwrap_or(ContentType::Text);
        let optimistic_content = attachment
            .as_ref()
            .map(|f| f.file_name.clone())
            .unwrap_or_else(|| content.to_string());

        let message = Message {
            id: correlation_id.clone(),
            kind: self.role.message_kind(),
            content: optimistic_content,
            content_type,
            seen: false,
            local: true,
            created_at: Utc::now().to_rfc3339(),
            conversation_id: self.conversation_id.clone(),
        };

        // The counterpart sees the optimistic copy before any request
        // completes.
        self.state = apply(
            std::mem::take(&mut self.state),
            ChatEvent::OptimisticInsert {
                message: message.clone(),
            },
        );
        self.sink.emit(ClientEvent::MessageSent {
            message,
            recipient_key: self.role.recipient_key(&self.conversation_id),
        });

        match self.persist_message(content, attachment, content_type).await {
            Ok(confirmed) => {
                self.state = apply(
                    std::mem::take(&mut self.state),
                    ChatEvent::Confirm {
                        correlation_id: correlation_id.clone(),
                        message: confirmed.clone(),
                    },
                );
                self.sink.emit(ClientEvent::MessageUpdateSent {
                    message: confirmed.clone(),
                    correlation_id,
                });
                Ok(confirmed)
            }
            Err(e) => {
                warn!(correlation_id = %correlation_id, "durable write failed, rolling back: {}", e);
                self.state = apply(
                    std::mem::take(&mut self.state),
                    ChatEvent::Rollback { correlation_id },
                );
                Err(e)
            }
        }
    }

    /// Merge a relayed event into local state.
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::MessageReceived { message } => {
                if message.conversation_id != self.conversation_id {
                    return;
                }
                let needs_seen = !message.local && !message.seen;
                let message_id = message.id.clone();
                self.state = apply(
                    std::mem::take(&mut self.state),
                    ChatEvent::RemoteInsert { message },
                );
                if needs_seen {
                    self.mark_seen_best_effort(message_id).await;
                }
            }
            ServerEvent::MessageUpdated {
                message,
                correlation_id,
            } => {
                if message.conversation_id != self.conversation_id {
                    return;
                }
                if !self.state.contains(&correlation_id) {
                    // Already reconciled or never seen; nothing to do.
                    debug!(correlation_id = %correlation_id, "update for unknown correlation id ignored");
                    return;
                }
                let needs_seen = !message.seen;
                let message_id = message.id.clone();
                self.state = apply(
                    std::mem::take(&mut self.state),
                    ChatEvent::RemoteUpdate {
                        correlation_id,
                        message,
                    },
                );
                if needs_seen {
                    self.mark_seen_best_effort(message_id).await;
                }
            }
            ServerEvent::ConversationStarted { conversation } => {
                if !self.is_conversation_active(&conversation.id) {
                    self.active_conversations.push(conversation.id);
                }
            }
            ServerEvent::JoinedConversation { conversation_id } => {
                if !self.is_conversation_active(&conversation_id) {
                    self.active_conversations.push(conversation_id);
                }
            }
            ServerEvent::LeftConversation { conversation_id } => {
                self.active_conversations.retain(|id| id != &conversation_id);
            }
            ServerEvent::JoinedConversations { conversation_ids } => {
                self.active_conversations = conversation_ids;
            }
        }
    }

    async fn persist_message(
        &self,
        content: &str,
        attachment: Option<FileUpload>,
        content_type: ContentType,
    ) -> Result<Message, ApiError> {
        let filedata = match attachment {
            Some(file) => Some(
                self.storage
                    .upload(self.role.tenant_key().to_string(), file)
                    .await?,
            ),
            None => None,
        };
        self.store
            .create_message(NewMessage {
                conversation_id: self.conversation_id.clone(),
                content: filedata
                    .as_ref()
                    .map(|f| f.location.clone())
                    .unwrap_or_else(|| content.to_string()),
                content_type,
                kind: self.role.message_kind(),
                file_id: filedata.map(|f| f.id),
            })
            .await
    }

    /// Counterpart messages are marked seen once their confirmed copy is in
    /// local state; a failure here only costs the read receipt.
    async fn mark_seen_best_effort(&self, message_id: String) {
        if let Err(e) = self.store.mark_seen(message_id.clone()).await {
            warn!(message_id = %message_id, "failed to mark message seen: {}", e);
        }
    }

    /// Timestamp-derived token, unique per session: two sends inside one
    /// millisecond get consecutive values instead of a duplicate.
    fn next_correlation_id(&mut self) -> String {
        let now_ms = Utc::now().timestamp_millis();
        let id = now_ms.max(self.last_correlation_ms + 1);
        self.last_correlation_ms = id;
        id.to_string()
    }
}

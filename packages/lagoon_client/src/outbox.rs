//! Optimistic Outbox
//!
//! The local message list and the pure reducer that evolves it. Every
//! transition the send/receive protocol needs is one `ChatEvent`; the
//! reducer has no I/O and no clock, so the reconciliation rules are
//! testable without a network or transport in sight.

use lagoon_protocol::Message;

/// Local view of one conversation's messages, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
}

impl ChatState {
    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }
}

/// Transitions over [`ChatState`].
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The local user hit send: show the message immediately, tagged
    /// `local`, with its correlation id standing in for the persisted id.
    OptimisticInsert { message: Message },
    /// The durable write came back: replace the optimistic entry matched by
    /// correlation id with the server-confirmed message.
    Confirm {
        correlation_id: String,
        message: Message,
    },
    /// The durable write failed: drop the optimistic entry.
    Rollback { correlation_id: String },
    /// A counterpart's message arrived over the relay.
    RemoteInsert { message: Message },
    /// A counterpart's optimistic message was confirmed; same replacement
    /// rule as [`ChatEvent::Confirm`], driven by the relayed update.
    RemoteUpdate {
        correlation_id: String,
        message: Message,
    },
}

/// Apply one event. Replacements by an unknown correlation id are no-ops:
/// the entry was already reconciled, rolled back, or never seen here.
pub fn apply(mut state: ChatState, event: ChatEvent) -> ChatState {
    match event {
        ChatEvent::OptimisticInsert { message } | ChatEvent::RemoteInsert { message } => {
            state.messages.insert(0, message);
        }
        ChatEvent::Confirm {
            correlation_id,
            message,
        }
        | ChatEvent::RemoteUpdate {
            correlation_id,
            message,
        } => {
            if let Some(slot) = state.messages.iter_mut().find(|m| m.id == correlation_id) {
                *slot = Message {
                    local: false,
                    ..message
                };
            }
        }
        ChatEvent::Rollback { correlation_id } => {
            state.messages.retain(|m| m.id != correlation_id);
        }
    }
    state
}

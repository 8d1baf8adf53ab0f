//! Client-side core for the Lagoon live-chat platform.
//!
//! Shared by the widget and dashboard front-ends: the optimistic message
//! reducer, the chat session driving the dual-write send protocol, and the
//! REST/object-storage seams toward the authoritative API. The relay
//! transport itself is the embedding application's concern; this crate only
//! needs something to `emit` into.

pub mod api;
pub mod outbox;
pub mod session;

pub use api::{
    ApiError, DurableStore, EventSink, FileUpload, NewConversation, NewMessage, ObjectStorage,
    ResponsePayload, RestClient,
};
pub use outbox::{ChatEvent, ChatState, apply};
pub use session::{ChatSession, Role};

//! REST and Object-Storage Seams
//!
//! The durable side of the dual-write protocol. The store and upload
//! contracts are traits so the session logic runs against scripted fakes in
//! tests; `RestClient` is the production implementation speaking the API's
//! `{status, result, message}` envelope.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use lagoon_protocol::{
    ClientEvent, ContentType, ConversationSummary, FileData, Message, MessageKind,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success envelope.
    #[error("server rejected the request: {0}")]
    Rejected(String),

    /// A success envelope with no result body.
    #[error("malformed response envelope")]
    Envelope,

    #[error("{0}")]
    Unsupported(String),
}

/// The API's uniform response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ResponsePayload<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ResponsePayload<T> {
    pub fn into_result(self) -> Result<T, ApiError> {
        let ResponsePayload {
            status,
            result,
            message,
        } = self;
        if status == "success" {
            result.ok_or(ApiError::Envelope)
        } else {
            Err(ApiError::Rejected(message.unwrap_or(status)))
        }
    }
}

/// Request body for opening a conversation from the widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub name: String,
    pub email: String,
    pub api_key: String,
}

/// Request body for persisting a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: String,
    pub content: String,
    pub content_type: ContentType,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
}

/// A conversation with its transcript, as returned on (re)connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTranscript {
    #[serde(flatten)]
    pub conversation: ConversationSummary,
    pub messages: Vec<Message>,
}

/// An attachment queued for upload ahead of its message record.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Classify the resulting message by the attachment's mime type.
    pub fn content_type(&self) -> ContentType {
        if self.mime_type.starts_with("image/") {
            ContentType::Image
        } else if self.mime_type.starts_with("video/") {
            ContentType::Video
        } else if self.mime_type.starts_with("audio/") {
            ContentType::Audio
        } else {
            ContentType::File
        }
    }
}

/// The authoritative CRUD API, as far as this crate needs it.
pub trait DurableStore: Send + Sync {
    fn create_conversation(
        &self,
        req: NewConversation,
    ) -> BoxFuture<'_, Result<ConversationSummary, ApiError>>;

    fn fetch_conversation(
        &self,
        conversation_id: String,
    ) -> BoxFuture<'_, Result<ConversationTranscript, ApiError>>;

    /// Persist a message. Returns the full confirmed record, including the
    /// server-assigned id and timestamp, so the optimistic entry can be
    /// replaced verbatim.
    fn create_message(&self, req: NewMessage) -> BoxFuture<'_, Result<Message, ApiError>>;

    fn mark_seen(&self, message_id: String) -> BoxFuture<'_, Result<(), ApiError>>;
}

/// Attachment storage; the upload must finish before the message record is
/// created so the record can carry the public location.
pub trait ObjectStorage: Send + Sync {
    fn upload(
        &self,
        tenant_key: String,
        file: FileUpload,
    ) -> BoxFuture<'_, Result<FileData, ApiError>>;
}

/// Outbound half of the relay transport: fire-and-forget, never suspends.
pub trait EventSink {
    fn emit(&self, event: ClientEvent);
}

/// reqwest-backed implementation of both seams.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl DurableStore for RestClient {
    fn create_conversation(
        &self,
        req: NewConversation,
    ) -> BoxFuture<'_, Result<ConversationSummary, ApiError>> {
        Box::pin(async move {
            let payload: ResponsePayload<ConversationSummary> = self
                .http
                .post(self.url("/api/v1/conversations"))
                .json(&req)
                .send()
                .await?
                .json()
                .await?;
            payload.into_result()
        })
    }

    fn fetch_conversation(
        &self,
        conversation_id: String,
    ) -> BoxFuture<'_, Result<ConversationTranscript, ApiError>> {
        Box::pin(async move {
            let payload: ResponsePayload<ConversationTranscript> = self
                .http
                .get(self.url(&format!("/api/v1/conversations/{}", conversation_id)))
                .send()
                .await?
                .json()
                .await?;
            payload.into_result()
        })
    }

    fn create_message(&self, req: NewMessage) -> BoxFuture<'_, Result<Message, ApiError>> {
        Box::pin(async move {
            let payload: ResponsePayload<Message> = self
                .http
                .post(self.url("/api/v1/messages"))
                .json(&req)
                .send()
                .await?
                .json()
                .await?;
            payload.into_result()
        })
    }

    fn mark_seen(&self, message_id: String) -> BoxFuture<'_, Result<(), ApiError>> {
        Box::pin(async move {
            let payload: ResponsePayload<serde_json::Value> = self
                .http
                .put(self.url(&format!("/api/v1/messages/{}/seen", message_id)))
                .send()
                .await?
                .json()
                .await?;
            payload.into_result().map(|_| ())
        })
    }
}

impl ObjectStorage for RestClient {
    fn upload(
        &self,
        tenant_key: String,
        file: FileUpload,
    ) -> BoxFuture<'_, Result<FileData, ApiError>> {
        Box::pin(async move {
            let part = reqwest::multipart::Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.mime_type)?;
            let form = reqwest::multipart::Form::new()
                .text("apiKey", tenant_key)
                .part("file", part);
            let payload: ResponsePayload<FileData> = self
                .http
                .post(self.url("/api/v1/files/upload"))
                .multipart(form)
                .send()
                .await?
                .json()
                .await?;
            payload.into_result()
        })
    }
}

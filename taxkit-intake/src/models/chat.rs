//! Chat message entity and the streamed conversation protocol events

use crate::models::document::Document;
use crate::models::memory::DetectedMemory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message sender within an intake conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Accountant,
    Ai,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::Accountant => "accountant",
            MessageSender::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accountant" => Some(MessageSender::Accountant),
            "ai" => Some(MessageSender::Ai),
            _ => None,
        }
    }
}

/// One message in an intake conversation. Immutable once created; ordered
/// by creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub intake_id: Uuid,
    pub sender: MessageSender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Events of the chat-stream protocol, in emission order
///
/// A successful turn emits: one `accountant_message`, zero or one
/// `memories`, zero or more `chunk`, then exactly one terminal `complete`.
/// Concatenating `chunk` payloads in order reconstructs the persisted AI
/// reply carried by `complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// The persisted accountant message, echoing the client idempotency
    /// token so the optimistic placeholder can be replaced without
    /// flicker or duplication
    AccountantMessage {
        message: ChatMessage,
        client_token: String,
    },

    /// Candidate memories detected early in the turn, emitted before the
    /// reply finishes so the UI can offer confirm/dismiss immediately
    Memories { detected: Vec<DetectedMemory> },

    /// Incremental fragment of the AI reply, in generation order
    Chunk { text: String },

    /// Terminal event: the turn is durably persisted
    Complete {
        message: ChatMessage,
        memories: Vec<DetectedMemory>,
        requested_documents: Vec<Document>,
    },
}

impl ChatStreamEvent {
    /// Event name used for SSE framing
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatStreamEvent::AccountantMessage { .. } => "accountant_message",
            ChatStreamEvent::Memories { .. } => "memories",
            ChatStreamEvent::Chunk { .. } => "chunk",
            ChatStreamEvent::Complete { .. } => "complete",
        }
    }
}

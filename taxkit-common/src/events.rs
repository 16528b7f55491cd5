//! Event types for the TaxKit event system
//!
//! Provides the shared event enum and EventBus used for SSE broadcasting.

use crate::types::IntakeStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Upload pipeline step, in pipeline order
///
/// `Complete` and `Error` are terminal; listeners reset their display after
/// a short grace delay once either arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStep {
    Uploading,
    Analyzing,
    Extracting,
    Matching,
    Generating,
    Complete,
    Error,
}

impl UploadStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStep::Uploading => "uploading",
            UploadStep::Analyzing => "analyzing",
            UploadStep::Extracting => "extracting",
            UploadStep::Matching => "matching",
            UploadStep::Generating => "generating",
            UploadStep::Complete => "complete",
            UploadStep::Error => "error",
        }
    }

    /// True for steps after which no further progress arrives
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStep::Complete | UploadStep::Error)
    }
}

/// TaxKit event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntakeEvent {
    /// Upload pipeline progress tick
    ///
    /// Emitted at each pipeline step for every file in an upload batch.
    /// Listeners may join mid-sequence; there is no replay.
    UploadProgress {
        /// Customer whose intake is being processed (subscription key)
        customer_id: Uuid,
        /// Intake receiving the upload
        intake_id: Uuid,
        /// Current pipeline step
        step: UploadStep,
        /// Progress percentage (0-100)
        percent: u8,
        /// Human-readable description of the current operation
        detail: String,
        /// When progress was recorded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Intake status recomputed to a new value
    IntakeStatusChanged {
        /// Intake whose status changed
        intake_id: Uuid,
        /// Status before recomputation
        old_status: IntakeStatus,
        /// Status after recomputation
        new_status: IntakeStatus,
        /// When status changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A requested document was fulfilled by an upload
    DocumentCompleted {
        intake_id: Uuid,
        document_id: Uuid,
        display_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new outstanding document request was recorded
    DocumentRequested {
        intake_id: Uuid,
        document_id: Uuid,
        display_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chat turn finished and its result is durably persisted
    ChatTurnCompleted {
        intake_id: Uuid,
        /// Persisted AI message id
        message_id: Uuid,
        /// Number of document requests derived from the turn (post-dedup)
        requested_documents: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A memory was confirmed and persisted
    MemoryRecorded {
        /// Customer scope; None = firm scope
        customer_id: Option<Uuid>,
        memory_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl IntakeEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &str {
        match self {
            IntakeEvent::UploadProgress { .. } => "UploadProgress",
            IntakeEvent::IntakeStatusChanged { .. } => "IntakeStatusChanged",
            IntakeEvent::DocumentCompleted { .. } => "DocumentCompleted",
            IntakeEvent::DocumentRequested { .. } => "DocumentRequested",
            IntakeEvent::ChatTurnCompleted { .. } => "ChatTurnCompleted",
            IntakeEvent::MemoryRecorded { .. } => "MemoryRecorded",
        }
    }
}

/// Central event distribution bus for application-wide events
///
/// Backed by tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntakeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IntakeEvent,
    ) -> Result<usize, broadcast::error::SendError<IntakeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Progress ticks use this: it is not an error for no UI to be open.
    pub fn emit_lossy(&self, event: IntakeEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

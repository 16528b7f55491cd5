//! Analysis adapter
//!
//! Wraps the opaque document-classification and chat-completion calls
//! behind a narrow interface. Everything above this module depends only on
//! the trait; the concrete Anthropic client lives in `claude`. Callers
//! fail closed on any error from this seam: an unanalyzed upload is
//! preserved but never certifies a gating decision, and a failed chat call
//! degrades into an explicitly labeled reply, never fabricated success.

pub mod claude;
mod prompts;

pub use claude::ClaudeClient;

use crate::models::{ChatMessage, DetectedMemory, Document, DocumentRequest, Memory, Provenance};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taxkit_common::Result;
use tokio::sync::mpsc;

/// One structured fact extracted from an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub category: String,
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

/// Classification of one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the file is a legible, recognized tax document
    pub is_valid: bool,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub extracted_facts: Vec<ExtractedFact>,
    /// Narrative feedback shown to the accountant
    pub feedback: String,
}

/// Context supplied to a chat turn
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub customer_name: String,
    pub tax_year: String,
    /// Current document set of the intake
    pub documents: Vec<Document>,
    pub firm_notes: Option<String>,
    pub customer_notes: Option<String>,
}

/// Incremental output from a chat turn, in generation order
#[derive(Debug, Clone)]
pub enum ResponseFragment {
    /// Candidate memories, available before the reply finishes
    Memories(Vec<DetectedMemory>),
    /// One fragment of the natural-language reply
    Text(String),
}

/// Final structured result of a chat turn
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Full reply text; equals the concatenation of emitted Text fragments
    pub reply: String,
    pub detected_memories: Vec<DetectedMemory>,
    pub requested_documents: Vec<DocumentRequest>,
}

/// The analysis seam consumed by the upload pipeline, the chat
/// coordinator, and the memory synthesizer
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Classify one uploaded file and extract structured facts
    async fn classify(&self, file_name: &str, content: &[u8]) -> Result<Classification>;

    /// Run one chat turn
    ///
    /// Fragments are delivered through `fragments` as they become
    /// available (memories first when detected, then reply text in
    /// order); the returned outcome carries the final structured result.
    /// Send failures on the channel are ignored — a caller that dropped
    /// its receiver still gets the outcome.
    async fn respond(
        &self,
        history: &[ChatMessage],
        message: &str,
        context: &ChatContext,
        fragments: mpsc::Sender<ResponseFragment>,
    ) -> Result<ChatOutcome>;

    /// Merge memories at one scope into a single coherent notes document
    async fn synthesize(&self, memories: &[Memory], scope_label: &str) -> Result<String>;
}

//! Document entities and request payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taxkit_common::types::DocumentStatus;
use uuid::Uuid;

/// Evidence pointer recorded when structured fields were extracted from a
/// specific place in an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// A requested or completed document within an intake
///
/// Identity is stable across edits: reconciliation mutates status and
/// file reference on an existing row or creates a new row, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub intake_id: Uuid,
    pub display_name: String,
    pub status: DocumentStatus,
    /// Structured document type, e.g. "W-2", "1099-INT", "Form 1040"
    pub doc_type: Option<String>,
    /// Tax year the document covers, e.g. "2024"
    pub year: Option<String>,
    /// Payer/employer name, e.g. "Microsoft"
    pub entity: Option<String>,
    pub provenance: Option<Provenance>,
    /// Stored-file reference (content digest); set when completed by an upload
    pub file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A structured document request derived from a chat turn or from
/// prior-return analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub display_name: String,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
}

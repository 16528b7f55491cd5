//! Domain status enums shared between services, events, and persistence

use serde::{Deserialize, Serialize};

/// Intake workflow status
///
/// Progresses forward only: AWAITING_PRIOR_RETURN → INCOMPLETE → READY,
/// with the single exception that a new outstanding document request
/// reopens READY back to INCOMPLETE. Only the state machine writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntakeStatus {
    /// Gated: waiting for a certified prior-year return. Chat is upload-only.
    AwaitingPriorReturn,
    /// Prior return accepted; outstanding document requests remain
    Incomplete,
    /// No outstanding requests and at least one completed document
    Ready,
}

impl IntakeStatus {
    /// Status as the database/wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeStatus::AwaitingPriorReturn => "AWAITING_PRIOR_RETURN",
            IntakeStatus::Incomplete => "INCOMPLETE",
            IntakeStatus::Ready => "READY",
        }
    }

    /// Parse from the database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWAITING_PRIOR_RETURN" => Some(IntakeStatus::AwaitingPriorReturn),
            "INCOMPLETE" => Some(IntakeStatus::Incomplete),
            "READY" => Some(IntakeStatus::Ready),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document fulfillment status
///
/// Transitions only REQUESTED → COMPLETED, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Asked for but not yet uploaded/matched
    Requested,
    /// Uploaded and matched (or created directly from an upload)
    Completed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Requested => "REQUESTED",
            DocumentStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(DocumentStatus::Requested),
            "COMPLETED" => Some(DocumentStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Memory entities
//!
//! A memory is a discrete candidate fact detected in conversation, pending
//! confirmation. Confirmed memories form an append-only audit log,
//! independent of the synthesized notes they feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope a detected memory should be remembered at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedScope {
    /// Applies firm-wide (process preferences, firm policies)
    Firm,
    /// Applies to the customer the intake belongs to
    Customer,
}

/// A candidate fact detected during a chat turn, not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedMemory {
    pub content: String,
    #[serde(default = "default_scope")]
    pub scope: DetectedScope,
}

fn default_scope() -> DetectedScope {
    DetectedScope::Customer
}

/// A confirmed, persisted memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    /// Customer scope; None = firm scope
    pub customer_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

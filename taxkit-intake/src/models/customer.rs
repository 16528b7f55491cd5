//! Customer and intake entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taxkit_common::types::IntakeStatus;
use uuid::Uuid;

/// A firm client. Immutable once created except for `notes`, which is the
/// synthesized customer-scope memory document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
    /// Synthesized customer notes (overwritten wholesale, never appended)
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One customer's document-collection workflow for one tax year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intake {
    pub id: Uuid,
    pub customer_id: Uuid,
    /// Tax year as entered, e.g. "2024"
    pub tax_year: String,
    /// Derived state; only the state machine writes it after creation
    pub status: IntakeStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Intake {
    /// Tax year as a number, if parseable
    pub fn tax_year_number(&self) -> Option<i32> {
        self.tax_year.trim().parse().ok()
    }

    /// The year whose return gates this intake (tax year minus one)
    pub fn prior_year(&self) -> Option<i32> {
        self.tax_year_number().map(|y| y - 1)
    }
}

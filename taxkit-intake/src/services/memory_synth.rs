//! Memory synthesizer
//!
//! Merges the memory audit log at one scope into a single coherent notes
//! document that replaces the previous notes wholesale. Synthesis is a
//! full overwrite; concurrent synthesis resolves last-writer-wins with no
//! merge attempted. A provider failure leaves the previous notes untouched
//! rather than overwriting good notes with a degraded placeholder.

use crate::analysis::AnalysisProvider;
use crate::db;
use sqlx::SqlitePool;
use taxkit_common::{Error, Result};
use uuid::Uuid;

/// Scope a synthesis run operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryScope {
    /// Firm-wide notes stored in firm settings
    Firm,
    /// One customer's notes stored on the customer row
    Customer(Uuid),
}

impl MemoryScope {
    pub fn customer_id(&self) -> Option<Uuid> {
        match self {
            MemoryScope::Firm => None,
            MemoryScope::Customer(id) => Some(*id),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MemoryScope::Firm => "firm-wide preferences",
            MemoryScope::Customer(_) => "one customer",
        }
    }
}

/// Synthesize the notes document for a scope from its full memory log
///
/// Idempotent for a stable memory set: re-running with no new memories
/// produces semantically equivalent notes. Returns the new notes; with no
/// memories at the scope nothing is written and the current notes (if any)
/// are returned unchanged.
pub async fn synthesize_scope(
    db: &SqlitePool,
    provider: &dyn AnalysisProvider,
    scope: MemoryScope,
) -> Result<String> {
    let memories = db::memories::list_for_scope(db, scope.customer_id()).await?;

    if memories.is_empty() {
        let current = read_notes(db, scope).await?;
        return Ok(current.unwrap_or_default());
    }

    let notes = provider.synthesize(&memories, scope.label()).await?;

    write_notes(db, scope, &notes).await?;

    tracing::info!(
        scope = ?scope,
        memories = memories.len(),
        notes_chars = notes.len(),
        "Synthesized notes"
    );

    Ok(notes)
}

async fn read_notes(db: &SqlitePool, scope: MemoryScope) -> Result<Option<String>> {
    match scope {
        MemoryScope::Firm => db::settings::get_firm_notes(db).await,
        MemoryScope::Customer(customer_id) => {
            let customer = db::customers::get(db, customer_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Customer not found: {}", customer_id)))?;
            Ok(customer.notes)
        }
    }
}

async fn write_notes(db: &SqlitePool, scope: MemoryScope, notes: &str) -> Result<()> {
    match scope {
        MemoryScope::Firm => db::settings::set_firm_notes(db, notes).await,
        MemoryScope::Customer(customer_id) => {
            db::customers::update_notes(db, customer_id, notes).await
        }
    }
}

//! Memory database operations
//!
//! Memories are an append-only audit log. The synthesized notes they feed
//! live on the customer row (customer scope) or in firm_settings (firm
//! scope), not here.

use crate::models::Memory;
use sqlx::{Row, SqlitePool};
use taxkit_common::Result;
use uuid::Uuid;

fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<Memory> {
    let id: String = row.get("id");
    let customer_id: Option<String> = row.get("customer_id");
    let created_at: String = row.get("created_at");

    Ok(Memory {
        id: super::parse_uuid(&id)?,
        customer_id: customer_id.map(|c| super::parse_uuid(&c)).transpose()?,
        content: row.get("content"),
        created_at: super::parse_timestamp(&created_at)?,
    })
}

/// Append a memory at the given scope (None = firm)
pub async fn insert(
    pool: &SqlitePool,
    customer_id: Option<Uuid>,
    content: &str,
) -> Result<Memory> {
    let memory = Memory {
        id: Uuid::new_v4(),
        customer_id,
        content: content.to_string(),
        created_at: chrono::Utc::now(),
    };

    sqlx::query("INSERT INTO memories (id, customer_id, content, created_at) VALUES (?, ?, ?, ?)")
        .bind(memory.id.to_string())
        .bind(memory.customer_id.map(|c| c.to_string()))
        .bind(&memory.content)
        .bind(memory.created_at.to_rfc3339())
        .execute(pool)
        .await?;

    tracing::debug!(
        memory_id = %memory.id,
        scope = %memory.customer_id.map(|c| c.to_string()).unwrap_or_else(|| "firm".to_string()),
        "Recorded memory"
    );

    Ok(memory)
}

/// List all memories at a scope in creation order (synthesis input)
pub async fn list_for_scope(pool: &SqlitePool, customer_id: Option<Uuid>) -> Result<Vec<Memory>> {
    let rows = match customer_id {
        Some(customer_id) => {
            sqlx::query(
                "SELECT * FROM memories WHERE customer_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(customer_id.to_string())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM memories WHERE customer_id IS NULL ORDER BY created_at ASC, id ASC")
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(row_to_memory).collect()
}

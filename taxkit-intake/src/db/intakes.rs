//! Intake database operations

use crate::models::Intake;
use sqlx::{Row, SqlitePool};
use taxkit_common::types::IntakeStatus;
use taxkit_common::{Error, Result};
use uuid::Uuid;

fn row_to_intake(row: &sqlx::sqlite::SqliteRow) -> Result<Intake> {
    let id: String = row.get("id");
    let customer_id: String = row.get("customer_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(Intake {
        id: super::parse_uuid(&id)?,
        customer_id: super::parse_uuid(&customer_id)?,
        tax_year: row.get("tax_year"),
        status: IntakeStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Invalid intake status in database: {}", status)))?,
        notes: row.get("notes"),
        created_at: super::parse_timestamp(&created_at)?,
    })
}

/// Insert a new intake. Always starts AWAITING_PRIOR_RETURN.
pub async fn insert(pool: &SqlitePool, customer_id: Uuid, tax_year: &str) -> Result<Intake> {
    let intake = Intake {
        id: Uuid::new_v4(),
        customer_id,
        tax_year: tax_year.to_string(),
        status: IntakeStatus::AwaitingPriorReturn,
        notes: None,
        created_at: chrono::Utc::now(),
    };

    sqlx::query(
        "INSERT INTO intakes (id, customer_id, tax_year, status, notes, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(intake.id.to_string())
    .bind(intake.customer_id.to_string())
    .bind(&intake.tax_year)
    .bind(intake.status.as_str())
    .bind(&intake.notes)
    .bind(intake.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(intake_id = %intake.id, tax_year = %intake.tax_year, "Created intake");

    Ok(intake)
}

/// Load an intake by id
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Intake>> {
    let row = sqlx::query("SELECT * FROM intakes WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_intake).transpose()
}

/// List intakes for a customer, newest first
pub async fn list_for_customer(pool: &SqlitePool, customer_id: Uuid) -> Result<Vec<Intake>> {
    let rows = sqlx::query("SELECT * FROM intakes WHERE customer_id = ? ORDER BY created_at DESC")
        .bind(customer_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_intake).collect()
}

/// Persist a recomputed status. Only the state machine calls this.
pub async fn update_status(pool: &SqlitePool, id: Uuid, status: IntakeStatus) -> Result<()> {
    sqlx::query("UPDATE intakes SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    tracing::debug!(intake_id = %id, status = %status, "Updated intake status");

    Ok(())
}

/// Delete an intake and everything below it (documents, messages, details)
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let id_str = id.to_string();

    // Explicit child deletes so cascade behavior does not depend on the
    // connection's foreign_keys pragma state
    sqlx::query("DELETE FROM customer_details WHERE intake_id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM chat_messages WHERE intake_id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM documents WHERE intake_id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;

    let result = sqlx::query("DELETE FROM intakes WHERE id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Intake not found: {}", id)));
    }

    tracing::info!(intake_id = %id, "Deleted intake and children");

    Ok(())
}

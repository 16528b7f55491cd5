//! Customer detail database operations
//!
//! Details are keyed by (intake, category, label): at most one row per key,
//! enforced by upsert against the unique index rather than by id identity.

use sqlx::{Row, SqlitePool};
use taxkit_common::Result;
use uuid::Uuid;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted structured fact about a customer within an intake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetail {
    pub id: Uuid,
    pub intake_id: Uuid,
    pub category: String,
    pub label: String,
    pub value: String,
    pub provenance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_detail(row: &sqlx::sqlite::SqliteRow) -> Result<CustomerDetail> {
    let id: String = row.get("id");
    let intake_id: String = row.get("intake_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(CustomerDetail {
        id: super::parse_uuid(&id)?,
        intake_id: super::parse_uuid(&intake_id)?,
        category: row.get("category"),
        label: row.get("label"),
        value: row.get("value"),
        provenance: row.get("provenance"),
        created_at: super::parse_timestamp(&created_at)?,
        updated_at: super::parse_timestamp(&updated_at)?,
    })
}

/// Upsert a detail by (intake, category, label)
///
/// A repeated key keeps the original row id and creation time; value,
/// provenance, and updated_at take the latest write.
pub async fn upsert(
    pool: &SqlitePool,
    intake_id: Uuid,
    category: &str,
    label: &str,
    value: &str,
    provenance: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO customer_details (
            id, intake_id, category, label, value, provenance, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(intake_id, category, label) DO UPDATE SET
            value = excluded.value,
            provenance = excluded.provenance,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(intake_id.to_string())
    .bind(category)
    .bind(label)
    .bind(value)
    .bind(provenance)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// List details for an intake, grouped by category then label
pub async fn list_for_intake(pool: &SqlitePool, intake_id: Uuid) -> Result<Vec<CustomerDetail>> {
    let rows = sqlx::query(
        "SELECT * FROM customer_details WHERE intake_id = ? ORDER BY category ASC, label ASC",
    )
    .bind(intake_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detail).collect()
}

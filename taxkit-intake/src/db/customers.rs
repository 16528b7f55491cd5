//! Customer database operations

use crate::models::Customer;
use sqlx::{Row, SqlitePool};
use taxkit_common::Result;
use uuid::Uuid;

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(Customer {
        id: super::parse_uuid(&id)?,
        display_name: row.get("display_name"),
        email: row.get("email"),
        notes: row.get("notes"),
        created_at: super::parse_timestamp(&created_at)?,
    })
}

/// Insert a new customer
pub async fn insert(
    pool: &SqlitePool,
    display_name: &str,
    email: Option<&str>,
) -> Result<Customer> {
    let customer = Customer {
        id: Uuid::new_v4(),
        display_name: display_name.to_string(),
        email: email.map(str::to_string),
        notes: None,
        created_at: chrono::Utc::now(),
    };

    sqlx::query(
        "INSERT INTO customers (id, display_name, email, notes, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(customer.id.to_string())
    .bind(&customer.display_name)
    .bind(&customer.email)
    .bind(&customer.notes)
    .bind(customer.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(customer_id = %customer.id, "Created customer");

    Ok(customer)
}

/// Load a customer by id
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Customer>> {
    let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_customer).transpose()
}

/// List all customers, newest first
pub async fn list(pool: &SqlitePool) -> Result<Vec<Customer>> {
    let rows = sqlx::query("SELECT * FROM customers ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_customer).collect()
}

/// Overwrite the synthesized customer notes (full replacement, not append)
pub async fn update_notes(pool: &SqlitePool, id: Uuid, notes: &str) -> Result<()> {
    let result = sqlx::query("UPDATE customers SET notes = ? WHERE id = ?")
        .bind(notes)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(taxkit_common::Error::NotFound(format!(
            "Customer not found: {}",
            id
        )));
    }

    Ok(())
}

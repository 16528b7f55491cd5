//! Database access for taxkit-intake
//!
//! SQLite via sqlx. Tables are created at pool init; the service is the
//! sole mutator of every entity it owns.

pub mod customers;
pub mod details;
pub mod documents;
pub mod intakes;
pub mod memories;
pub mod messages;
pub mod settings;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use taxkit_common::Error;
use uuid::Uuid;

/// Initialize database connection pool
///
/// Connects to the SQLite file under the data folder, creating it (and its
/// parent directory) if missing, then runs table initialization.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with the schema applied (tests, tooling)
///
/// Capped at one connection: pooled `:memory:` databases are otherwise
/// per-connection, so concurrent tasks would see different databases.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(":memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Initialize tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            email TEXT,
            notes TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS intakes (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            tax_year TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'AWAITING_PRIOR_RETURN',
            notes TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            intake_id TEXT NOT NULL REFERENCES intakes(id) ON DELETE CASCADE,
            display_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'REQUESTED',
            doc_type TEXT,
            year TEXT,
            entity TEXT,
            provenance TEXT,
            file_ref TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id TEXT PRIMARY KEY,
            intake_id TEXT NOT NULL REFERENCES intakes(id) ON DELETE CASCADE,
            sender TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one row per (intake, category, label); enforced by the unique
    // index so writes can upsert instead of checking first
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customer_details (
            id TEXT PRIMARY KEY,
            intake_id TEXT NOT NULL REFERENCES intakes(id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            label TEXT NOT NULL,
            value TEXT NOT NULL,
            provenance TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(intake_id, category, label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            customer_id TEXT REFERENCES customers(id),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS firm_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}

/// Parse a stored uuid column
pub(crate) fn parse_uuid(s: &str) -> taxkit_common::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse a stored RFC3339 timestamp column
pub(crate) fn parse_timestamp(s: &str) -> taxkit_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

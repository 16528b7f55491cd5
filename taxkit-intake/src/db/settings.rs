//! Firm settings key/value persistence
//!
//! Holds the firm-scope synthesized notes document.

use sqlx::SqlitePool;
use taxkit_common::Result;

const FIRM_NOTES_KEY: &str = "firm_notes";

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM firm_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

/// Write a setting value (insert or replace)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO firm_settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read the synthesized firm notes document
pub async fn get_firm_notes(pool: &SqlitePool) -> Result<Option<String>> {
    get_setting(pool, FIRM_NOTES_KEY).await
}

/// Overwrite the synthesized firm notes document (full replacement)
pub async fn set_firm_notes(pool: &SqlitePool, notes: &str) -> Result<()> {
    set_setting(pool, FIRM_NOTES_KEY, notes).await
}

//! Chat message database operations

use crate::models::{ChatMessage, MessageSender};
use sqlx::{Row, SqlitePool};
use taxkit_common::{Error, Result};
use uuid::Uuid;

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage> {
    let id: String = row.get("id");
    let intake_id: String = row.get("intake_id");
    let sender: String = row.get("sender");
    let created_at: String = row.get("created_at");

    Ok(ChatMessage {
        id: super::parse_uuid(&id)?,
        intake_id: super::parse_uuid(&intake_id)?,
        sender: MessageSender::parse(&sender)
            .ok_or_else(|| Error::Internal(format!("Invalid sender in database: {}", sender)))?,
        content: row.get("content"),
        created_at: super::parse_timestamp(&created_at)?,
    })
}

/// Insert a message. Messages are immutable once created.
pub async fn insert(
    pool: &SqlitePool,
    intake_id: Uuid,
    sender: MessageSender,
    content: &str,
) -> Result<ChatMessage> {
    let message = ChatMessage {
        id: Uuid::new_v4(),
        intake_id,
        sender,
        content: content.to_string(),
        created_at: chrono::Utc::now(),
    };

    sqlx::query(
        "INSERT INTO chat_messages (id, intake_id, sender, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(message.id.to_string())
    .bind(message.intake_id.to_string())
    .bind(message.sender.as_str())
    .bind(&message.content)
    .bind(message.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(message)
}

/// List messages for an intake in creation order
pub async fn list_for_intake(pool: &SqlitePool, intake_id: Uuid) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        "SELECT * FROM chat_messages WHERE intake_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(intake_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_message).collect()
}

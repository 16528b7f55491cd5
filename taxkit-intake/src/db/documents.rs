//! Document database operations
//!
//! A document's identity is stable across edits: reconciliation either
//! mutates an existing row (REQUESTED → COMPLETED with a file reference)
//! or inserts a new row.

use crate::models::{Document, DocumentRequest, Provenance};
use sqlx::{Row, SqlitePool};
use taxkit_common::types::DocumentStatus;
use taxkit_common::{Error, Result};
use uuid::Uuid;

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let id: String = row.get("id");
    let intake_id: String = row.get("intake_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let completed_at: Option<String> = row.get("completed_at");
    let provenance: Option<String> = row.get("provenance");

    let provenance: Option<Provenance> = provenance
        .map(|p| {
            serde_json::from_str(&p)
                .map_err(|e| Error::Internal(format!("Invalid provenance in database: {}", e)))
        })
        .transpose()?;

    Ok(Document {
        id: super::parse_uuid(&id)?,
        intake_id: super::parse_uuid(&intake_id)?,
        display_name: row.get("display_name"),
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Invalid document status in database: {}", status)))?,
        doc_type: row.get("doc_type"),
        year: row.get("year"),
        entity: row.get("entity"),
        provenance,
        file_ref: row.get("file_ref"),
        created_at: super::parse_timestamp(&created_at)?,
        completed_at: completed_at
            .map(|t| super::parse_timestamp(&t))
            .transpose()?,
    })
}

async fn insert_document(pool: &SqlitePool, document: &Document) -> Result<()> {
    let provenance = document
        .provenance
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize provenance: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO documents (
            id, intake_id, display_name, status, doc_type, year, entity,
            provenance, file_ref, created_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(document.id.to_string())
    .bind(document.intake_id.to_string())
    .bind(&document.display_name)
    .bind(document.status.as_str())
    .bind(&document.doc_type)
    .bind(&document.year)
    .bind(&document.entity)
    .bind(&provenance)
    .bind(&document.file_ref)
    .bind(document.created_at.to_rfc3339())
    .bind(document.completed_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a new REQUESTED document from a structured request
pub async fn insert_requested(
    pool: &SqlitePool,
    intake_id: Uuid,
    request: &DocumentRequest,
) -> Result<Document> {
    let document = Document {
        id: Uuid::new_v4(),
        intake_id,
        display_name: request.display_name.clone(),
        status: DocumentStatus::Requested,
        doc_type: request.doc_type.clone(),
        year: request.year.clone(),
        entity: request.entity.clone(),
        provenance: None,
        file_ref: None,
        created_at: chrono::Utc::now(),
        completed_at: None,
    };

    insert_document(pool, &document).await?;

    tracing::debug!(
        document_id = %document.id,
        intake_id = %intake_id,
        display_name = %document.display_name,
        "Created requested document"
    );

    Ok(document)
}

/// Insert a new document directly as COMPLETED (upload matched nothing)
#[allow(clippy::too_many_arguments)]
pub async fn insert_completed(
    pool: &SqlitePool,
    intake_id: Uuid,
    display_name: &str,
    doc_type: Option<&str>,
    year: Option<&str>,
    entity: Option<&str>,
    provenance: Option<Provenance>,
    file_ref: &str,
) -> Result<Document> {
    let now = chrono::Utc::now();
    let document = Document {
        id: Uuid::new_v4(),
        intake_id,
        display_name: display_name.to_string(),
        status: DocumentStatus::Completed,
        doc_type: doc_type.map(str::to_string),
        year: year.map(str::to_string),
        entity: entity.map(str::to_string),
        provenance,
        file_ref: Some(file_ref.to_string()),
        created_at: now,
        completed_at: Some(now),
    };

    insert_document(pool, &document).await?;

    tracing::debug!(
        document_id = %document.id,
        intake_id = %intake_id,
        file_ref = %file_ref,
        "Created completed document"
    );

    Ok(document)
}

/// Mark a REQUESTED document COMPLETED, recording the file reference
///
/// Forward-only: a document already COMPLETED is left untouched and
/// reported as an invalid-input error.
pub async fn mark_completed(
    pool: &SqlitePool,
    document_id: Uuid,
    file_ref: &str,
    provenance: Option<Provenance>,
) -> Result<Document> {
    let provenance_json = provenance
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize provenance: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE documents
        SET status = 'COMPLETED', file_ref = ?, completed_at = ?,
            provenance = COALESCE(?, provenance)
        WHERE id = ? AND status = 'REQUESTED'
        "#,
    )
    .bind(file_ref)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&provenance_json)
    .bind(document_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidInput(format!(
            "Document {} is not in REQUESTED state",
            document_id
        )));
    }

    let document = get(pool, document_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Document not found: {}", document_id)))?;

    tracing::debug!(
        document_id = %document_id,
        file_ref = %file_ref,
        "Marked document completed"
    );

    Ok(document)
}

/// Load a document by id
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Document>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_document).transpose()
}

/// List all documents for an intake, oldest first (tie-break order for the matcher)
pub async fn list_for_intake(pool: &SqlitePool, intake_id: Uuid) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT * FROM documents WHERE intake_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(intake_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_document).collect()
}

/// Find a document in an intake already holding the given file reference
///
/// Used for upload idempotency: re-uploading identical bytes must not
/// create a second COMPLETED record.
pub async fn find_by_file_ref(
    pool: &SqlitePool,
    intake_id: Uuid,
    file_ref: &str,
) -> Result<Option<Document>> {
    let row = sqlx::query("SELECT * FROM documents WHERE intake_id = ? AND file_ref = ?")
        .bind(intake_id.to_string())
        .bind(file_ref)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_document).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{customers, init_memory_pool, intakes};

    async fn setup_intake(pool: &SqlitePool) -> Uuid {
        let customer = customers::insert(pool, "Dana Reyes", None).await.unwrap();
        intakes::insert(pool, customer.id, "2024").await.unwrap().id
    }

    fn w2_request() -> DocumentRequest {
        DocumentRequest {
            display_name: "W-2 from Microsoft for 2024".to_string(),
            doc_type: Some("W-2".to_string()),
            year: Some("2024".to_string()),
            entity: Some("Microsoft".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_requested_then_complete() {
        let pool = init_memory_pool().await.unwrap();
        let intake_id = setup_intake(&pool).await;

        let document = insert_requested(&pool, intake_id, &w2_request()).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Requested);
        assert!(document.file_ref.is_none());

        let completed = mark_completed(&pool, document.id, "abc123", None).await.unwrap();
        assert_eq!(completed.status, DocumentStatus::Completed);
        assert_eq!(completed.file_ref.as_deref(), Some("abc123"));
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_completed_is_forward_only() {
        let pool = init_memory_pool().await.unwrap();
        let intake_id = setup_intake(&pool).await;

        let document = insert_requested(&pool, intake_id, &w2_request()).await.unwrap();
        mark_completed(&pool, document.id, "abc123", None).await.unwrap();

        // Second completion attempt must fail, not overwrite
        let result = mark_completed(&pool, document.id, "different", None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let loaded = get(&pool, document.id).await.unwrap().unwrap();
        assert_eq!(loaded.file_ref.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_find_by_file_ref() {
        let pool = init_memory_pool().await.unwrap();
        let intake_id = setup_intake(&pool).await;

        insert_completed(
            &pool,
            intake_id,
            "2023 Form 1040",
            Some("Form 1040"),
            Some("2023"),
            None,
            None,
            "digest-1",
        )
        .await
        .unwrap();

        let found = find_by_file_ref(&pool, intake_id, "digest-1").await.unwrap();
        assert!(found.is_some());
        let missing = find_by_file_ref(&pool, intake_id, "digest-2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_creation() {
        let pool = init_memory_pool().await.unwrap();
        let intake_id = setup_intake(&pool).await;

        let first = insert_requested(&pool, intake_id, &w2_request()).await.unwrap();
        let second = insert_requested(
            &pool,
            intake_id,
            &DocumentRequest {
                display_name: "1099-INT from Chase for 2024".to_string(),
                doc_type: Some("1099-INT".to_string()),
                year: Some("2024".to_string()),
                entity: Some("Chase".to_string()),
            },
        )
        .await
        .unwrap();

        let documents = list_for_intake(&pool, intake_id).await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id, first.id);
        assert_eq!(documents[1].id, second.id);
    }
}

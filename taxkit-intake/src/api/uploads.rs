//! Upload endpoint
//!
//! Accepts multipart file uploads against an intake and runs the upload
//! pipeline. The response carries the resulting documents, the narrative
//! chat messages written during processing, and the recomputed intake
//! status; progress ticks stream separately to any listener subscribed to
//! the customer's progress feed.

use axum::{
    extract::{Multipart, Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use taxkit_common::types::IntakeStatus;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ChatMessage, Document};
use crate::services::{UploadPipeline, UploadedFile};
use crate::{db, AppState};

/// POST /intakes/{id}/uploads response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub documents: Vec<Document>,
    pub messages: Vec<ChatMessage>,
    pub status: IntakeStatus,
}

/// POST /intakes/{id}/uploads
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(intake_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let intake = db::intakes::get(&state.db, intake_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Intake not found: {}", intake_id)))?;
    let customer = db::customers::get(&state.db, intake.customer_id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("Intake {} has no customer row", intake_id))
        })?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}", files.len() + 1));
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        if bytes.is_empty() {
            return Err(ApiError::BadRequest(format!("{} is empty", file_name)));
        }

        files.push(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one file is required".to_string(),
        ));
    }

    tracing::info!(
        intake_id = %intake_id,
        files = files.len(),
        "Upload received"
    );

    let pipeline = UploadPipeline::new(
        state.db.clone(),
        state.event_bus.clone(),
        state.progress.clone(),
        state.provider.clone(),
        state.files_folder.clone(),
    );

    let outcome = pipeline.process_batch(&intake, &customer, files).await?;

    Ok(Json(UploadResponse {
        documents: outcome.documents,
        messages: outcome.messages,
        status: outcome.status,
    }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/intakes/:intake_id/uploads", post(upload_documents))
}

//! Memory confirm and audit endpoints
//!
//! Confirming a memory persists it and synchronously re-synthesizes the
//! notes at its scope. Dismissal is client-local and never reaches the
//! server.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use taxkit_common::events::IntakeEvent;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Memory;
use crate::services::memory_synth::{self, MemoryScope};
use crate::{db, AppState};

/// POST /memories request
#[derive(Debug, Deserialize)]
pub struct ConfirmMemoryRequest {
    /// Customer scope; omit for firm scope
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    pub content: String,
}

/// POST /memories response
#[derive(Debug, Serialize)]
pub struct ConfirmMemoryResponse {
    pub memory: Memory,
    /// Fresh synthesized notes at the memory's scope; None when synthesis
    /// was unavailable (the memory is still recorded)
    pub notes: Option<String>,
    /// Set when synthesis failed, so the client can label the outage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_error: Option<String>,
}

/// GET /memories query
#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    #[serde(default)]
    pub customer_id: Option<Uuid>,
}

/// POST /memories — confirm a detected memory
pub async fn confirm_memory(
    State(state): State<AppState>,
    Json(request): Json<ConfirmMemoryRequest>,
) -> ApiResult<Json<ConfirmMemoryResponse>> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let scope = match request.customer_id {
        Some(customer_id) => {
            db::customers::get(&state.db, customer_id)
                .await?
                .ok_or_else(|| {
                    ApiError::NotFound(format!("Customer not found: {}", customer_id))
                })?;
            MemoryScope::Customer(customer_id)
        }
        None => MemoryScope::Firm,
    };

    let memory =
        db::memories::insert(&state.db, request.customer_id, request.content.trim()).await?;

    state.event_bus.emit_lossy(IntakeEvent::MemoryRecorded {
        customer_id: request.customer_id,
        memory_id: memory.id,
        timestamp: chrono::Utc::now(),
    });

    // Synthesis failure leaves the previous notes untouched; the memory
    // itself is already durable
    let (notes, synthesis_error) =
        match memory_synth::synthesize_scope(&state.db, state.provider.as_ref(), scope).await {
            Ok(notes) => (Some(notes), None),
            Err(e) => {
                tracing::warn!(error = %e, "Memory recorded but synthesis unavailable");
                (None, Some(e.to_string()))
            }
        };

    Ok(Json(ConfirmMemoryResponse {
        memory,
        notes,
        synthesis_error,
    }))
}

/// GET /memories?customer_id= — audit view of the memory log at a scope
pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<ListMemoriesQuery>,
) -> ApiResult<Json<Vec<Memory>>> {
    Ok(Json(
        db::memories::list_for_scope(&state.db, query.customer_id).await?,
    ))
}

/// Build memory routes
pub fn memory_routes() -> Router<AppState> {
    Router::new().route("/memories", post(confirm_memory).get(list_memories))
}

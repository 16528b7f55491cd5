//! Intake CRUD handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::details::CustomerDetail;
use crate::error::{ApiError, ApiResult};
use crate::models::{ChatMessage, Document, Intake};
use crate::{db, AppState};

/// POST /customers/{id}/intakes request
#[derive(Debug, Deserialize)]
pub struct CreateIntakeRequest {
    pub tax_year: String,
}

/// GET /intakes/{id} response: the intake with everything it owns
#[derive(Debug, Serialize)]
pub struct IntakeDetailResponse {
    pub intake: Intake,
    pub documents: Vec<Document>,
    pub messages: Vec<ChatMessage>,
    pub details: Vec<CustomerDetail>,
}

/// POST /customers/{id}/intakes
///
/// A new intake always starts AWAITING_PRIOR_RETURN; the client cannot
/// choose a status.
pub async fn create_intake(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<CreateIntakeRequest>,
) -> ApiResult<Json<Intake>> {
    let tax_year = request.tax_year.trim();
    if tax_year.parse::<i32>().is_err() {
        return Err(ApiError::BadRequest(format!(
            "tax_year must be a year, got: {:?}",
            request.tax_year
        )));
    }

    db::customers::get(&state.db, customer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Customer not found: {}", customer_id)))?;

    let intake = db::intakes::insert(&state.db, customer_id, tax_year).await?;

    tracing::info!(intake_id = %intake.id, tax_year = %intake.tax_year, "Intake created");

    Ok(Json(intake))
}

/// GET /customers/{id}/intakes
pub async fn list_intakes(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Intake>>> {
    db::customers::get(&state.db, customer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Customer not found: {}", customer_id)))?;

    Ok(Json(
        db::intakes::list_for_customer(&state.db, customer_id).await?,
    ))
}

/// GET /intakes/{id}
pub async fn get_intake(
    State(state): State<AppState>,
    Path(intake_id): Path<Uuid>,
) -> ApiResult<Json<IntakeDetailResponse>> {
    let intake = db::intakes::get(&state.db, intake_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Intake not found: {}", intake_id)))?;

    let documents = db::documents::list_for_intake(&state.db, intake_id).await?;
    let messages = db::messages::list_for_intake(&state.db, intake_id).await?;
    let details = db::details::list_for_intake(&state.db, intake_id).await?;

    Ok(Json(IntakeDetailResponse {
        intake,
        documents,
        messages,
        details,
    }))
}

/// DELETE /intakes/{id} — cascades to documents, messages, details
pub async fn delete_intake(
    State(state): State<AppState>,
    Path(intake_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    db::intakes::delete(&state.db, intake_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build intake routes
pub fn intake_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/customers/:customer_id/intakes",
            post(create_intake).get(list_intakes),
        )
        .route("/intakes/:intake_id", get(get_intake).delete(delete_intake))
}

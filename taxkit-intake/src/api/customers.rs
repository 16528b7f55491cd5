//! Customer CRUD handlers

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Customer;
use crate::{db, AppState};

/// POST /customers request
#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /customers
pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<CreateCustomerRequest>,
) -> ApiResult<Json<Customer>> {
    if request.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "display_name must not be empty".to_string(),
        ));
    }

    let customer = db::customers::insert(
        &state.db,
        request.display_name.trim(),
        request.email.as_deref(),
    )
    .await?;

    tracing::info!(customer_id = %customer.id, "Customer created");

    Ok(Json(customer))
}

/// GET /customers
pub async fn list_customers(State(state): State<AppState>) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(db::customers::list(&state.db).await?))
}

/// GET /customers/{id}
pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Json<Customer>> {
    let customer = db::customers::get(&state.db, customer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Customer not found: {}", customer_id)))?;

    Ok(Json(customer))
}

/// Build customer routes
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", post(create_customer).get(list_customers))
        .route("/customers/:customer_id", get(get_customer))
}

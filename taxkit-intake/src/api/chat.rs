//! Chat-stream endpoint
//!
//! One accountant submission opens one SSE response carrying the ordered
//! protocol events. The turn itself runs in a spawned task feeding a
//! channel this stream drains, so a dropped connection never cancels the
//! turn — it completes and persists regardless.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use taxkit_common::types::IntakeStatus;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::chat_turn::{self, ChatTurnInput};
use crate::{db, AppState};

/// POST /intakes/{id}/chat
///
/// Rejected with 409 while the intake is AWAITING_PRIOR_RETURN: until a
/// certified prior-year return arrives the conversation is upload-only.
/// Enforced here regardless of any client-side disabling — the client is
/// not a trust boundary.
pub async fn chat_stream(
    State(state): State<AppState>,
    Path(intake_id): Path<Uuid>,
    Json(input): Json<ChatTurnInput>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if input.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    if input.client_token.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "client_token must not be empty".to_string(),
        ));
    }

    let intake = db::intakes::get(&state.db, intake_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Intake not found: {}", intake_id)))?;

    if intake.status == IntakeStatus::AwaitingPriorReturn {
        return Err(ApiError::Conflict(format!(
            "Intake {} is waiting for the prior-year return; upload it before chatting",
            intake_id
        )));
    }

    let customer = db::customers::get(&state.db, intake.customer_id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("Intake {} has no customer row", intake_id))
        })?;

    let (event_tx, mut event_rx) = mpsc::channel(32);

    // The turn outlives this connection by design
    tokio::spawn(chat_turn::run_turn(
        state.db.clone(),
        state.event_bus.clone(),
        state.provider.clone(),
        state.turn_locks.clone(),
        intake,
        customer,
        input,
        event_tx,
    ));

    let stream = async_stream::stream! {
        while let Some(event) = event_rx.recv().await {
            let terminal = matches!(event, crate::models::ChatStreamEvent::Complete { .. });

            match serde_json::to_string(&event) {
                Ok(json) => {
                    yield Ok(Event::default().event(event.event_type()).data(json));
                }
                Err(e) => {
                    warn!("Chat stream: failed to serialize event: {}", e);
                }
            }

            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Build chat routes
pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/intakes/:intake_id/chat", post(chat_stream))
}

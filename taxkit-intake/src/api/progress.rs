//! Progress SSE endpoint
//!
//! Streams upload-pipeline progress for one customer. Listeners may join
//! mid-sequence; there is no replay. Disconnecting drops the subscription,
//! which removes itself from the registry.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::{db, AppState};

/// GET /progress/{customer_id}
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    db::customers::get(&state.db, customer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Customer not found: {}", customer_id)))?;

    info!(customer_id = %customer_id, "Progress listener connected");

    let mut subscription = state.progress.subscribe(customer_id);

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat keeps idle connections alive
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("Progress stream: heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = subscription.recv() => {
                    match received {
                        Some(event) => {
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    yield Ok(Event::default()
                                        .event(event.event_type())
                                        .data(json));
                                }
                                Err(e) => {
                                    warn!("Progress stream: failed to serialize event: {}", e);
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

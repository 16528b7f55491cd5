//! Global SSE event stream
//!
//! Streams every service event (status changes, document activity, chat
//! completions) to monitoring UIs. Per-customer upload progress has its
//! own keyed endpoint; this stream is the firehose.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to service events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                Ok(event) = rx.recv() => {
                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => {
                            warn!("SSE: failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

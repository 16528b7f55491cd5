//! taxkit-intake - Tax-Year Intake Workflow Service
//!
//! Guides an accountant through collecting a customer's tax documents:
//! uploads are analyzed, reconciled against requested documents, and fed
//! through the intake state machine, while a streaming conversation and a
//! progress broadcaster keep the client in sync.

pub mod analysis;
pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use crate::analysis::AnalysisProvider;
use crate::services::{ProgressRegistry, TurnLocks};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use taxkit_common::events::EventBus;

/// Application state shared across handlers
///
/// Every dependency is constructed explicitly and injected here — no
/// module-level singletons — so tests can assemble a state with an
/// in-memory database and a scripted analysis provider.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for the global SSE stream
    pub event_bus: EventBus,
    /// Keyed progress broadcaster for upload pipelines
    pub progress: ProgressRegistry,
    /// Analysis seam (classification, chat turns, synthesis)
    pub provider: Arc<dyn AnalysisProvider>,
    /// Per-intake chat turn serialization
    pub turn_locks: TurnLocks,
    /// Folder storing uploaded file content by digest
    pub files_folder: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        provider: Arc<dyn AnalysisProvider>,
        files_folder: PathBuf,
    ) -> Self {
        Self {
            db,
            event_bus,
            progress: ProgressRegistry::new(),
            provider,
            turn_locks: TurnLocks::new(),
            files_folder,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::customer_routes())
        .merge(api::intake_routes())
        .merge(api::upload_routes())
        .merge(api::chat_routes())
        .merge(api::memory_routes())
        .route("/events", get(api::event_stream))
        .route("/progress/:customer_id", get(api::progress_stream))
        .with_state(state)
}

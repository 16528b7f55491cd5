//! Core services: reconciliation, state machine, pipelines, broadcasting

pub mod chat_turn;
pub mod intake_state;
pub mod matcher;
pub mod memory_synth;
pub mod progress;
pub mod upload_pipeline;

pub use chat_turn::TurnLocks;
pub use progress::ProgressRegistry;
pub use upload_pipeline::{UploadOutcome, UploadPipeline, UploadedFile};

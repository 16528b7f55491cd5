//! Shared building blocks for TaxKit services
//!
//! Provides the common error type, domain status enums, the event system
//! used for SSE broadcasting, and configuration resolution.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};

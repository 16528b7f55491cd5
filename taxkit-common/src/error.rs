//! Common error types for TaxKit

use thiserror::Error;

/// Common result type for TaxKit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across TaxKit services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Document analysis / model call failure.
    ///
    /// Callers must fail closed on this: an unanalyzed upload is preserved
    /// but never certifies a gating decision.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

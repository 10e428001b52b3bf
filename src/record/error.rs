//! Error types for transfer record operations.

use thiserror::Error;

/// Errors from the transfer record store.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record exists with the given id.
    #[error("transfer record not found: {0}")]
    NotFound(i64),

    /// The record already reached `success` or `failed` and is frozen.
    #[error("transfer record {0} is no longer active")]
    NotActive(i64),
}

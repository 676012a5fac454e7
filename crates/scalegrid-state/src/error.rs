//! Error types for the ScaleGrid state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state store: {0}")]
    Open(String),

    /// Beginning or committing a redb transaction failed.
    #[error("storage transaction failed: {0}")]
    Transaction(String),

    #[error("failed to open table: {0}")]
    Table(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    /// A stored value no longer decodes as the record type of its table.
    #[error("corrupt record in '{table}': {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("action log sequence exhausted")]
    SequenceExhausted,
}

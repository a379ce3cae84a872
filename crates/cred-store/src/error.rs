use std::io;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization of a log record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A complete log record failed its integrity check.
    #[error("corrupt log record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

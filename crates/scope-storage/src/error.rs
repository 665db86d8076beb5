//! Storage error types.

use thiserror::Error;

/// Errors raised by the persistence pipeline itself (not by individual jobs).
#[derive(Error, Debug)]
pub enum StorageError {
    /// `try_submit` found no free slot.
    #[error("Job queue is full")]
    QueueFull,

    /// All workers are gone; nothing will consume the job.
    #[error("Job queue is closed")]
    QueueClosed,

    /// Writing metadata (manifest, coordinates) failed.
    #[error("Metadata write failed: {0}")]
    Metadata(String),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

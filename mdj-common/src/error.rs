//! Common error types for the Magic DJ session engine
//!
//! Defines the typed error taxonomy using thiserror for clear error
//! propagation across the storage and state-store crates.

use thiserror::Error;

/// Common result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by all engine components
#[derive(Error, Debug)]
pub enum Error {
    /// The local binary store could not be opened (after retries).
    ///
    /// Fatal for local-audio features this session; callers must degrade to
    /// "no local audio persistence" rather than abort.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A save would exceed the remaining storage budget.
    ///
    /// Recoverable by user action (delete tracks, raise the budget).
    #[error("storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Transient driver failure during a write. Never retried internally;
    /// the decision to retry belongs to the caller.
    #[error("write error: {0}")]
    Write(String),

    /// Transient driver failure during a read. Never retried internally.
    #[error("read error: {0}")]
    Read(String),

    /// Malformed import payload, rejected before any state mutation
    #[error("validation error: {0}")]
    Validation(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal engine error
    #[error("internal error: {0}")]
    Internal(String),
}

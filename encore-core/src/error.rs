//! Error types for Encore operations

use crate::SongId;
use thiserror::Error;

/// Durable store errors.
///
/// Every variant is a transient failure of the external store: recoverable by
/// retrying on a later reconciliation pass, or surfaced to the caller when it
/// happens on the read-through path. "Record absent" is not an error; store
/// reads report it as `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Increment failed for song {id}: {reason}")]
    IncrementFailed { id: SongId, reason: String },
}

/// Top-level error type wrapping all failure domains.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoreError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invariant violated: {reason}")]
    Invariant { reason: String },
}

/// Result type alias for Encore operations.
pub type EncoreResult<T> = Result<T, EncoreError>;

// =============================================================================
// TESTS
// =============================================================================

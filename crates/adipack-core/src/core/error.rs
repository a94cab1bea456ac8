//! adipack Error Definitions
//!
//! Defines error types used throughout the pipeline.

use thiserror::Error;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Media Errors
    // =========================================================================
    #[error("Media unreadable: {0}")]
    MediaUnreadable(String),

    #[error("Frame extraction failed at {offset_secs}s: {reason}")]
    FrameExtractionFailed { offset_secs: u64, reason: String },

    // =========================================================================
    // Package Errors
    // =========================================================================
    #[error("Archive write failed: {0}")]
    ArchiveWriteFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Local artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Storage credentials missing or rejected: {0}")]
    CredentialsUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage rejected request: {0}")]
    StorageRejected(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Only transient storage failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_))
    }
}

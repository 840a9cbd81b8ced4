//! Error types for the tidemark engine
//!
//! This module defines all error types that can occur during engine
//! operations. The taxonomy deliberately keeps graph-level "conflicts" out of
//! the error space: concurrent modification is always resolved by merging,
//! and unresolvable content merges are recorded as conflicted commits rather
//! than reported as failures. What remains here are storage faults, dangling
//! references, and corruption.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the tidemark engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for all engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object not found in content-addressed storage
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Operation not found in the operation log
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// A caller referenced a commit, change, or workspace absent from the
    /// current view. No state is mutated when this is returned.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Storage backend failure. Safe to retry; nothing is ever overwritten,
    /// so prior state is intact.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Repository state directory is not initialized
    #[error("Repository not initialized at path: {0:?}")]
    RepoNotInitialized(PathBuf),

    /// Repository state directory already exists
    #[error("Repository already exists at path: {0:?}")]
    RepoAlreadyExists(PathBuf),

    /// Hash mismatch while verifying stored content
    #[error("Hash mismatch - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Expected hash value
        expected: String,
        /// Actual computed hash value
        actual: String,
    },

    /// Corruption detected in stored records
    #[error("Corruption detected: {0}")]
    CorruptionDetected(String),

    /// Decompression of a stored object failed
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// The operation log contains no head pointer
    #[error("Operation log has no head")]
    MissingOperationHead,

    /// File skipped during a working-copy scan because it exceeds the
    /// configured limit
    #[error("File too large: {path:?} ({size} bytes exceeds limit of {limit} bytes)")]
    FileTooLarge {
        /// Path to the file
        path: PathBuf,
        /// Actual file size
        size: u64,
        /// Configured size limit
        limit: u64,
    },

    /// Path could not be represented as a repo-relative UTF-8 path
    #[error("Path conversion error: {0:?}")]
    PathConversion(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        EngineError::StorageUnavailable(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Create an invalid-reference error with a custom message
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        EngineError::InvalidReference(msg.into())
    }

    /// Check if this error is recoverable by retrying the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageUnavailable(_) | EngineError::Io(_)
        )
    }

    /// Check if this error indicates corruption of stored state
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            EngineError::CorruptionDetected(_)
                | EngineError::HashMismatch { .. }
                | EngineError::Decompression(_)
        )
    }
}

// SPDX-License-Identifier: Apache-2.0
//
// Unified error types for Scanbook.

use thiserror::Error;

/// Top-level error type for all Scanbook operations.
#[derive(Debug, Error)]
pub enum ScanbookError {
    // -- Caller errors --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// A mutation would break a document invariant (e.g. deleting the last
    /// remaining page). Rejected before any write takes effect.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid export configuration: {0}")]
    Configuration(String),

    // -- Document processing --
    #[error("image processing failed: {0}")]
    Image(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanbookError>;

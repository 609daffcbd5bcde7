//! Error types for needlestore
//!
//! Provides a unified error type for all volume operations.

use thiserror::Error;

use crate::id::NeedleId;

/// Result type alias using NeedleError
pub type Result<T> = std::result::Result<T, NeedleError>;

/// Unified error type for needlestore operations
#[derive(Debug, Error)]
pub enum NeedleError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    /// Absent or tombstoned needle. An expected outcome, not a failure.
    #[error("Needle {0} not found")]
    NotFound(NeedleId),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index error: {0}")]
    Index(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NeedleError {
    /// Build a `CorruptRecord` error
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        NeedleError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// True for the `NotFound` outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, NeedleError::NotFound(_))
    }
}

//! Error types for bridge operations.
//!
//! None of these cross the public bridge surface: module failures are mapped
//! to "no result" and storage failures to in-memory defaults. They exist so
//! the internal call paths can use `?` and so diagnostics can name the cause.

use thiserror::Error;

/// Result type for calls into the external compute module.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Result type for weight persistence.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced at the external compute module boundary.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module is not loaded (degraded mode).
    #[error("Compute module unavailable: {0}")]
    Unavailable(String),

    /// The module does not implement this operation.
    #[error("Operation not supported by compute module: {0}")]
    Unsupported(&'static str),

    /// The module reported a failure for a single call.
    #[error("Compute module call failed: {0}")]
    Failed(String),

    /// The module panicked while servicing a call.
    #[error("Compute module panicked during {0}")]
    Panicked(&'static str),

    /// The module speaks a different contract version.
    #[error("Contract version mismatch: expected {expected}, module reports {found}")]
    VersionMismatch {
        /// Version this bridge was built against.
        expected: u32,
        /// Version reported by the module.
        found: u32,
    },

    /// Payload encoding/decoding error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while reading or writing persisted weights.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend is not usable in this environment.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

//! Error types for state persistence.

use thiserror::Error;

use crate::crypto::ENCRYPTION_KEY_ENV;

/// Errors that can occur reading or writing persisted session state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Invalid session name or id (path traversal guard).
    #[error(transparent)]
    InvalidName(#[from] surf_core::DomainError),

    /// Resolved path escaped the sessions directory. Should be impossible
    /// once names validate, but checked anyway.
    #[error("state file path escapes the sessions directory: {path}")]
    PathEscape { path: String },

    /// Authentication failed during decryption: tampered payload or wrong
    /// key. No partial plaintext is ever returned.
    #[error("state decryption failed: data was tampered with or the key is wrong")]
    Tampered,

    /// Encryption itself failed (never expected with a valid 256-bit key).
    #[error("state encryption failed")]
    EncryptFailed,

    /// The file is encrypted but no key is configured. Expected and
    /// user-actionable, distinct from I/O failures.
    #[error("state file is encrypted but {ENCRYPTION_KEY_ENV} is not set; set it to decrypt")]
    MissingKey,

    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

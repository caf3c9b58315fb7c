//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session name contains characters outside `[A-Za-z0-9_-]`.
    ///
    /// Session names can originate from environment variables set by a
    /// caller the daemon does not trust, so this is a security boundary,
    /// not a usability nicety.
    #[error("invalid session name '{value}': only alphanumeric characters, hyphens, and underscores are allowed")]
    InvalidSessionName { value: String },

    /// Session id contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid session id '{value}': only alphanumeric characters, hyphens, and underscores are allowed")]
    InvalidSessionId { value: String },

    /// Invalid field value in configuration
    #[error("invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

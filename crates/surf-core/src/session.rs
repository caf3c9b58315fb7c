//! Validated session identifiers.
//!
//! A running daemon is addressed by a `SessionId` (socket/PID/port file
//! naming) and optionally carries a `SessionName` (auto-persisted state
//! file naming). Both end up embedded in filesystem paths, so both are
//! restricted to `[A-Za-z0-9_-]+` to make path traversal impossible by
//! construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Session id used when none is configured.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Returns true if `value` is a safe path component: non-empty and
/// containing only ASCII alphanumerics, hyphens, and underscores.
pub fn is_valid_component(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Identifier for a daemon session (one daemon process per id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parses and validates a session id.
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if !is_valid_component(&value) {
            return Err(DomainError::InvalidSessionId { value });
        }
        Ok(Self(value))
    }

    /// Returns the default session id.
    pub fn default_id() -> Self {
        Self(DEFAULT_SESSION_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-chosen name gating auto-persisted state for a session.
///
/// The persisted state file is named `<name>-<id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    /// Parses and validates a session name.
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if !is_valid_component(&value) {
            return Err(DomainError::InvalidSessionName { value });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_safe_components() {
        for value in ["default", "agent1", "my-session", "a_b-c", "A9_Z"] {
            assert!(is_valid_component(value), "should accept {value:?}");
            assert!(SessionId::parse(value).is_ok());
            assert!(SessionName::parse(value).is_ok());
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert!(!is_valid_component(""));
        assert!(SessionId::parse("").is_err());
        assert!(SessionName::parse("").is_err());
    }

    #[test]
    fn test_rejects_path_traversal() {
        for value in [
            "..",
            "../etc",
            "a/b",
            "a\\b",
            "..-sneaky",
            "x/../../y",
            "/absolute",
        ] {
            assert!(
                SessionName::parse(value).is_err(),
                "should reject {value:?}"
            );
        }
    }

    #[test]
    fn test_rejects_whitespace_and_control() {
        for value in ["a b", "a\tb", "a\nb", "a\0b", " leading", "trailing "] {
            assert!(SessionName::parse(value).is_err(), "should reject {value:?}");
        }
    }

    #[test]
    fn test_rejects_unicode_lookalikes() {
        // Homoglyphs, format characters, and fullwidth slashes must not pass.
        for value in ["сессия", "a\u{200b}b", "a\u{ff0f}b", "é"] {
            assert!(SessionName::parse(value).is_err(), "should reject {value:?}");
        }
    }

    #[test]
    fn test_error_names_offending_value() {
        let err = SessionName::parse("../oops").unwrap_err();
        assert!(err.to_string().contains("../oops"));
    }

    #[test]
    fn test_serde_transparent() {
        let id = SessionId::parse("agent1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"agent1\"");
    }
}

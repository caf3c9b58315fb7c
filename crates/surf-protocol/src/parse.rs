//! Parsing of incoming request lines.

use serde_json::Value;
use thiserror::Error;

use crate::command::{Action, Command};

/// Maximum accepted frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// A frame that could not be turned into a command.
///
/// `id` is recovered whenever the frame was valid JSON, so the error
/// response can still be correlated by the client.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub id: Option<String>,
    pub reason: String,
}

impl ParseFailure {
    fn new(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Parses one request line into a command.
///
/// Malformed JSON, a missing/empty `id`, or a missing/empty `action` all
/// produce a structured failure; the connection is expected to stay open
/// and answer with an error frame.
pub fn parse_command(line: &str) -> Result<Command, ParseFailure> {
    if line.len() > MAX_FRAME_SIZE {
        return Err(ParseFailure::new(
            None,
            format!("frame too large: {} bytes (max {MAX_FRAME_SIZE})", line.len()),
        ));
    }

    let value: Value = serde_json::from_str(line)
        .map_err(|e| ParseFailure::new(None, format!("invalid JSON: {e}")))?;

    let id = match value.get("id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id.to_string(),
        // Absent or empty: no id worth echoing back.
        _ => return Err(ParseFailure::new(None, "missing required field: id")),
    };

    let action = match value.get("action").and_then(|v| v.as_str()) {
        Some(name) if !name.is_empty() => Action::from_name(name),
        _ => {
            return Err(ParseFailure::new(
                Some(id),
                "missing required field: action",
            ))
        }
    };

    Ok(Command::new(id, action, value))
}

/// HTTP methods a browser `fetch()` probe could open a connection with.
const HTTP_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

/// Returns true if the first data on a connection looks like an HTTP
/// request line.
///
/// Browsers probing the local endpoint cross-origin must send HTTP headers
/// (`POST / HTTP/1.1`), while legitimate clients send raw JSON starting
/// with `{`. A connection matching this must be destroyed without parsing.
pub fn looks_like_http(first_chunk: &str) -> bool {
    let trimmed = first_chunk.trim_start();
    let Some(token) = trimmed.split_whitespace().next() else {
        return false;
    };
    // Require a separator after the method, as in a real request line.
    if trimmed.len() == token.len() {
        return false;
    }
    HTTP_METHODS
        .iter()
        .any(|method| token.eq_ignore_ascii_case(method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_command() {
        let cmd = parse_command(r#"{"id":"1","action":"launch","headless":false}"#).unwrap();
        assert_eq!(cmd.id, "1");
        assert_eq!(cmd.action, Action::Launch);
        assert_eq!(cmd.payload["headless"], false);
    }

    #[test]
    fn test_parse_unknown_action_is_automation() {
        let cmd = parse_command(r##"{"id":"7","action":"click","selector":"#go"}"##).unwrap();
        assert_eq!(cmd.action, Action::Automation("click".to_string()));
        assert_eq!(cmd.payload["selector"], "#go");
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = parse_command("{not json").unwrap_err();
        assert!(err.id.is_none());
        assert!(err.reason.contains("invalid JSON"));
    }

    #[test]
    fn test_parse_missing_id() {
        let err = parse_command(r#"{"action":"launch"}"#).unwrap_err();
        assert!(err.id.is_none());
        assert!(err.reason.contains("id"));
    }

    #[test]
    fn test_parse_empty_id_rejected() {
        // An empty id is as useless for correlation as a missing one.
        for line in [
            r#"{"id":"","action":"launch"}"#,
            r#"{"id":7,"action":"launch"}"#,
        ] {
            let err = parse_command(line).unwrap_err();
            assert!(err.id.is_none(), "no id recovered from {line}");
            assert!(err.reason.contains("id"));
        }
    }

    #[test]
    fn test_parse_missing_action_recovers_id() {
        let err = parse_command(r#"{"id":"42"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("42"));
        assert!(err.reason.contains("action"));
    }

    #[test]
    fn test_parse_oversized_frame() {
        let line = format!(
            r#"{{"id":"1","action":"type","text":"{}"}}"#,
            "x".repeat(MAX_FRAME_SIZE)
        );
        let err = parse_command(&line).unwrap_err();
        assert!(err.reason.contains("too large"));
    }

    #[test]
    fn test_http_detection() {
        assert!(looks_like_http("GET / HTTP/1.1\r\n"));
        assert!(looks_like_http("POST /api HTTP/1.1\r\n"));
        assert!(looks_like_http("  get / HTTP/1.1"));
        assert!(looks_like_http("OPTIONS * HTTP/1.1"));
    }

    #[test]
    fn test_http_detection_ignores_json() {
        assert!(!looks_like_http(r#"{"id":"1","action":"launch"}"#));
        assert!(!looks_like_http(""));
        assert!(!looks_like_http("   "));
        // A bare method with no request target is not an HTTP preamble.
        assert!(!looks_like_http("GET"));
        // JSON that merely mentions a method is fine.
        assert!(!looks_like_http(r#"{"id":"GET","action":"x"}"#));
    }
}

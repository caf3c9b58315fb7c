//! Response frames sent by the daemon to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One response per accepted command, in receipt order per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request id (`"unknown"` when the request had none).
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Placeholder id for frames whose own id could not be recovered.
pub const UNKNOWN_ID: &str = "unknown";

impl Response {
    /// Creates a success response.
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Serializes to a single JSON line (no trailing newline).
    pub fn to_line(&self) -> String {
        // Serialization of this shape cannot fail; fall back to a minimal
        // frame rather than panicking if it ever does.
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"id":"{UNKNOWN_ID}","success":false,"error":"serialization failure"}}"#)
        })
    }
}

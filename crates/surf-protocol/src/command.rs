//! Command frames sent by clients to the daemon.

use serde_json::Value;

/// Dispatch target for a command.
///
/// The daemon only understands session-lifecycle actions itself; everything
/// else is carried as `Automation` and forwarded untouched to the active
/// `Manager`, which owns browser action semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Explicitly launch (or re-launch) the automation backend.
    Launch,
    /// Save state, tear down the backend, and shut the daemon down.
    Close,
    /// List available devices; served without a launched backend.
    DeviceList,
    /// Any other action, forwarded to the `Manager` by name.
    Automation(String),
}

impl Action {
    pub fn from_name(name: &str) -> Self {
        match name {
            "launch" => Action::Launch,
            "close" => Action::Close,
            "device_list" => Action::DeviceList,
            other => Action::Automation(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Launch => "launch",
            Action::Close => "close",
            Action::DeviceList => "device_list",
            Action::Automation(name) => name,
        }
    }
}

/// A single decoded request frame.
#[derive(Debug, Clone)]
pub struct Command {
    /// Opaque request id, echoed back in the response.
    pub id: String,
    pub action: Action,
    /// The full original frame, kept so action-specific fields survive the
    /// trip to the `Manager` without the daemon modeling them.
    pub payload: Value,
}

impl Command {
    pub fn new(id: impl Into<String>, action: Action, payload: Value) -> Self {
        Self {
            id: id.into(),
            action,
            payload,
        }
    }
}

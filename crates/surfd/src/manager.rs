//! The automation backend seam.
//!
//! The daemon owns session lifecycle and transport; everything that actually
//! drives a browser lives behind [`Manager`]. The production implementation
//! is [`crate::DriverManager`]; tests substitute a mock.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use surf_core::LaunchOptions;
use surf_protocol::Command;

/// Errors surfaced by an automation backend.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The backend rejected or failed an action; the message is forwarded
    /// verbatim in the error response.
    #[error("{0}")]
    Automation(String),

    /// An action other than launch/close/device_list arrived while no
    /// backend is running and auto-launch also failed.
    #[error("automation backend is not launched")]
    NotLaunched,

    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver spoke something other than the expected frame protocol.
    #[error("driver protocol error: {0}")]
    Protocol(String),
}

/// A launched-or-launchable browser automation backend.
///
/// The daemon serializes access: one command executes at a time, so
/// implementations get `&mut self` and never need internal locking.
#[async_trait]
pub trait Manager: Send {
    /// Starts the backend with the given options. Idempotent: launching an
    /// already-launched backend is a no-op returning current status.
    async fn launch(&mut self, options: &LaunchOptions) -> Result<Value, ManagerError>;

    /// Whether the backend process is currently up.
    fn is_launched(&self) -> bool;

    /// Whether at least one page/target is open.
    async fn has_pages(&mut self) -> bool;

    /// Recovers a usable page when all pages were closed out from under us.
    async fn ensure_page(&mut self) -> Result<(), ManagerError>;

    /// Executes one automation command, returning its result data.
    async fn execute(&mut self, command: &Command) -> Result<Value, ManagerError>;

    /// Snapshot of the session's storage state (cookies, origins) for
    /// persistence.
    async fn storage_state(&mut self) -> Result<Value, ManagerError>;

    /// Lists devices available to the backend; must work without a launch.
    async fn list_devices(&mut self) -> Result<Value, ManagerError>;

    /// Tears the backend down. Must be safe to call when not launched.
    async fn close(&mut self) -> Result<(), ManagerError>;
}

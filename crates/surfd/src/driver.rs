//! Subprocess-backed [`Manager`] implementation.
//!
//! The daemon does not link a browser engine; it spawns a driver executable
//! and proxies commands to it as newline-delimited JSON over stdio, the same
//! frame shape clients use. The driver binary defaults to `surf-driver` on
//! `PATH` and can be overridden with `SURF_DRIVER`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::time::timeout;
use tracing::{debug, warn};

use surf_core::config::ENV_DRIVER;
use surf_core::{LaunchOptions, Provider};
use surf_protocol::{Command, Response};

use crate::manager::{Manager, ManagerError};

/// Driver executable looked up on `PATH` when `SURF_DRIVER` is unset.
pub const DEFAULT_DRIVER: &str = "surf-driver";

/// Grace period for the driver to exit after a close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request response deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

struct DriverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Drives a browser through a spawned driver subprocess.
pub struct DriverManager {
    provider: Provider,
    driver_path: String,
    process: Option<DriverProcess>,
    /// Sequence for ids on frames the daemon originates itself.
    seq: u64,
}

impl DriverManager {
    pub fn new(provider: Provider, driver_path: Option<String>) -> Self {
        Self {
            provider,
            driver_path: driver_path
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_DRIVER.to_string()),
            process: None,
            seq: 0,
        }
    }

    /// Builds a manager from process environment.
    pub fn from_env(provider: Provider) -> Self {
        Self::new(provider, std::env::var(ENV_DRIVER).ok())
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("drv-{}", self.seq)
    }

    fn spawn(&self) -> Result<DriverProcess, ManagerError> {
        let mut child = tokio::process::Command::new(&self.driver_path)
            .arg("--provider")
            .arg(self.provider.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ManagerError::Protocol("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| ManagerError::Protocol("driver stdout unavailable".to_string()))?;

        debug!(driver = %self.driver_path, provider = %self.provider.as_str(), "Driver spawned");

        Ok(DriverProcess {
            child,
            stdin,
            stdout,
        })
    }

    /// Sends one frame to the driver and awaits its response frame.
    async fn request(&mut self, frame: Value) -> Result<Value, ManagerError> {
        let process = self.process.as_mut().ok_or(ManagerError::NotLaunched)?;

        let line = serde_json::to_string(&frame)
            .map_err(|e| ManagerError::Protocol(format!("frame serialization: {e}")))?;
        process.stdin.write_all(line.as_bytes()).await?;
        process.stdin.write_all(b"\n").await?;
        process.stdin.flush().await?;

        let mut reply = String::new();
        let read = timeout(REQUEST_TIMEOUT, process.stdout.read_line(&mut reply)).await;
        let bytes = match read {
            Ok(result) => result?,
            Err(_) => return Err(ManagerError::Protocol("driver response timed out".into())),
        };
        if bytes == 0 {
            // Driver died mid-request; drop it so the next action relaunches.
            self.process = None;
            return Err(ManagerError::Protocol("driver closed its stream".into()));
        }

        let response: Response = serde_json::from_str(reply.trim())
            .map_err(|e| ManagerError::Protocol(format!("invalid driver frame: {e}")))?;

        if response.success {
            Ok(response.data.unwrap_or_else(|| json!({})))
        } else {
            Err(ManagerError::Automation(
                response
                    .error
                    .unwrap_or_else(|| "driver reported failure".to_string()),
            ))
        }
    }

    /// Daemon-originated request carrying only an action name.
    async fn request_action(&mut self, action: &str) -> Result<Value, ManagerError> {
        let id = self.next_id();
        self.request(json!({"id": id, "action": action})).await
    }
}

#[async_trait]
impl Manager for DriverManager {
    async fn launch(&mut self, options: &LaunchOptions) -> Result<Value, ManagerError> {
        if self.process.is_some() {
            return Ok(json!({"alreadyLaunched": true}));
        }

        self.process = Some(self.spawn()?);

        let id = self.next_id();
        let mut frame = serde_json::to_value(options)
            .map_err(|e| ManagerError::Protocol(format!("launch options: {e}")))?;
        if let Some(object) = frame.as_object_mut() {
            object.insert("id".to_string(), json!(id));
            object.insert("action".to_string(), json!("launch"));
        }

        match self.request(frame).await {
            Ok(data) => Ok(data),
            Err(e) => {
                // A failed launch leaves no usable process behind.
                self.process = None;
                Err(e)
            }
        }
    }

    fn is_launched(&self) -> bool {
        self.process.is_some()
    }

    async fn has_pages(&mut self) -> bool {
        // On probe failure assume pages exist; spurious recovery would churn
        // the backend for nothing.
        match self.request_action("status").await {
            Ok(data) => data.get("pages").and_then(|v| v.as_u64()).unwrap_or(1) > 0,
            Err(_) => true,
        }
    }

    async fn ensure_page(&mut self) -> Result<(), ManagerError> {
        self.request_action("ensure_page").await.map(|_| ())
    }

    async fn execute(&mut self, command: &Command) -> Result<Value, ManagerError> {
        // The client frame already carries id, action, and arguments.
        self.request(command.payload.clone()).await
    }

    async fn storage_state(&mut self) -> Result<Value, ManagerError> {
        self.request_action("storage_state").await
    }

    async fn list_devices(&mut self) -> Result<Value, ManagerError> {
        // Served by a one-shot driver invocation so no session gets launched
        // just to enumerate devices.
        let output = tokio::process::Command::new(&self.driver_path)
            .arg("--list-devices")
            .arg("--provider")
            .arg(self.provider.as_str())
            .stderr(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ManagerError::Automation(format!(
                "device listing failed with status {}",
                output.status
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ManagerError::Protocol(format!("invalid device list: {e}")))
    }

    async fn close(&mut self) -> Result<(), ManagerError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        // Ask nicely first; the driver flushes browser profiles on close.
        let id = self.next_id();
        let frame = format!("{{\"id\":\"{id}\",\"action\":\"close\"}}\n");
        let _ = process.stdin.write_all(frame.as_bytes()).await;
        let _ = process.stdin.flush().await;
        drop(process.stdin);

        match timeout(CLOSE_TIMEOUT, process.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = %status, "Driver exited");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed waiting for driver exit");
            }
            Err(_) => {
                warn!("Driver did not exit in time, killing it");
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_driver_path() {
        let manager = DriverManager::new(Provider::Desktop, None);
        assert_eq!(manager.driver_path, DEFAULT_DRIVER);
        let manager = DriverManager::new(Provider::Desktop, Some("".to_string()));
        assert_eq!(manager.driver_path, DEFAULT_DRIVER);
        let manager = DriverManager::new(Provider::Device, Some("/opt/driver".to_string()));
        assert_eq!(manager.driver_path, "/opt/driver");
    }

    #[tokio::test]
    async fn test_request_without_process_is_not_launched() {
        let mut manager = DriverManager::new(Provider::Desktop, None);
        let err = manager.request_action("status").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotLaunched));
    }

    #[tokio::test]
    async fn test_close_when_not_launched_is_ok() {
        let mut manager = DriverManager::new(Provider::Desktop, None);
        assert!(manager.close().await.is_ok());
        assert!(!manager.is_launched());
    }
}

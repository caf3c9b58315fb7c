//! Shared test harness: a mock automation backend plus a server fixture
//! rooted in temp directories.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use surf_core::session::SessionId;
use surf_core::{DaemonConfig, LaunchOptions, SessionPaths};
use surf_state::{parse_key, EncryptionKey, ENCRYPTION_KEY_ENV};
use surfd::manager::{Manager, ManagerError};
use surfd::server::ServerError;
use surfd::{DaemonContext, DaemonServer, ShutdownCoordinator};

/// Maximum time to wait for the server socket to appear.
pub const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks.
pub const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Observable state of the mock backend, shared with the test body.
#[derive(Debug, Default)]
pub struct MockState {
    pub launched: bool,
    pub pages: u64,
    pub launches: Vec<LaunchOptions>,
    pub executed: Vec<String>,
    pub ensure_page_calls: usize,
    pub close_calls: usize,
    pub storage: Value,
}

/// A scriptable in-process [`Manager`].
pub struct MockManager {
    state: Arc<Mutex<MockState>>,
}

impl MockManager {
    pub fn new() -> Self {
        let state = MockState {
            storage: json!({
                "cookies": [{"name": "sid", "value": "abc", "domain": "example.com"}],
                "origins": []
            }),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Handle the test keeps to observe and mutate backend state.
    pub fn handle(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl Manager for MockManager {
    async fn launch(&mut self, options: &LaunchOptions) -> Result<Value, ManagerError> {
        let mut state = self.state.lock().unwrap();
        state.launched = true;
        state.pages = 1;
        state.launches.push(options.clone());
        Ok(json!({}))
    }

    fn is_launched(&self) -> bool {
        self.state.lock().unwrap().launched
    }

    async fn has_pages(&mut self) -> bool {
        self.state.lock().unwrap().pages > 0
    }

    async fn ensure_page(&mut self) -> Result<(), ManagerError> {
        let mut state = self.state.lock().unwrap();
        state.ensure_page_calls += 1;
        state.pages = 1;
        Ok(())
    }

    async fn execute(
        &mut self,
        command: &surf_protocol::Command,
    ) -> Result<Value, ManagerError> {
        let mut state = self.state.lock().unwrap();
        if !state.launched {
            return Err(ManagerError::NotLaunched);
        }
        let action = command.action.as_str().to_string();
        state.executed.push(action.clone());
        Ok(json!({"echo": action}))
    }

    async fn storage_state(&mut self) -> Result<Value, ManagerError> {
        Ok(self.state.lock().unwrap().storage.clone())
    }

    async fn list_devices(&mut self) -> Result<Value, ManagerError> {
        Ok(json!({"devices": [{"name": "iPhone 15"}, {"name": "Pixel 8"}]}))
    }

    async fn close(&mut self) -> Result<(), ManagerError> {
        let mut state = self.state.lock().unwrap();
        state.launched = false;
        state.pages = 0;
        state.close_calls += 1;
        Ok(())
    }
}

/// Test server fixture that manages lifecycle and temp-dir cleanup.
pub struct TestServer {
    pub socket_path: PathBuf,
    pub paths: SessionPaths,
    pub sessions_dir: PathBuf,
    pub shutdown: ShutdownCoordinator,
    pub task: JoinHandle<Result<(), ServerError>>,
    _runtime_dir: TempDir,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawns a server with default configuration.
    pub async fn spawn(mock: MockManager) -> Self {
        Self::spawn_configured(mock, &[]).await
    }

    /// Spawns a server with the given environment pairs (fed to config
    /// parsing, never to the real process environment).
    pub async fn spawn_configured(mock: MockManager, env: &[(&str, &str)]) -> Self {
        Self::spawn_inner(mock, env, false).await
    }

    /// Spawns a server into a runtime dir already littered with a dead
    /// daemon's socket and PID files.
    pub async fn spawn_with_stale_artifacts(mock: MockManager) -> Self {
        Self::spawn_inner(mock, &[], true).await
    }

    async fn spawn_inner(mock: MockManager, env: &[(&str, &str)], stale: bool) -> Self {
        let runtime_dir = tempfile::tempdir().expect("create runtime dir");
        let data_dir = tempfile::tempdir().expect("create data dir");

        let pairs: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lookup = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        let config = DaemonConfig::from_lookup(&lookup);
        let launch = LaunchOptions::from_lookup(&lookup);
        let key: Option<EncryptionKey> =
            lookup(ENCRYPTION_KEY_ENV).and_then(|raw| parse_key(&raw));

        let paths = SessionPaths::new(runtime_dir.path(), config.session.clone());
        let sessions_dir = data_dir.path().to_path_buf();
        let socket_path = paths.socket_path();

        if stale {
            std::fs::write(paths.socket_path(), "").expect("write stale socket");
            std::fs::write(paths.pid_file(), "999999").expect("write stale pid");
        }

        let ctx = DaemonContext::new(config, launch, paths.clone(), sessions_dir.clone(), key);
        let shutdown = ShutdownCoordinator::new();
        let server = DaemonServer::new(ctx, Box::new(mock), shutdown.clone());

        let task = tokio::spawn(async move { server.run().await });

        // Wait until the socket is bound and the PID file marks the session
        // as running.
        let ready = |paths: &SessionPaths| {
            paths.socket_path().exists()
                && paths.read_pid() == Some(std::process::id())
        };
        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if ready(&paths) {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        assert!(
            ready(&paths),
            "Server did not become ready within {SOCKET_WAIT_TIMEOUT:?}"
        );

        Self {
            socket_path,
            paths,
            sessions_dir,
            shutdown,
            task,
            _runtime_dir: runtime_dir,
            _data_dir: data_dir,
        }
    }

    /// Creates a client connection to the server.
    pub async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Shuts the server down through the coordinator and waits for it.
    pub async fn shutdown(self) {
        self.shutdown
            .request(surfd::ShutdownReason::Signal("SIGTERM"));
        let _ = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD * 5, self.task).await;
    }
}

/// Session id used when tests don't set `SURF_SESSION`.
pub fn default_session() -> SessionId {
    SessionId::default_id()
}

/// Newline-JSON client over a Unix stream.
pub struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends one raw line (newline appended).
    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Sends raw bytes without framing (for HTTP probe tests).
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads one line; `None` means the server closed the connection.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let bytes = self.reader.read_line(&mut line).await.unwrap();
        if bytes == 0 {
            None
        } else {
            Some(line)
        }
    }

    /// Reads one response frame.
    pub async fn recv(&mut self) -> Value {
        let line = self.recv_line().await.expect("server closed connection");
        serde_json::from_str(&line).expect("valid response JSON")
    }

    /// Sends a command frame and reads its response.
    pub async fn request(&mut self, frame: Value) -> Value {
        self.send_line(&frame.to_string()).await;
        self.recv().await
    }
}

//! Per-client connection handling.
//!
//! Each connection reads newline-delimited JSON command frames and answers
//! each with exactly one response frame, in receipt order. Malformed frames
//! are answered with an error and the connection stays open; only an HTTP
//! preamble (a browser probing the socket) destroys the connection without
//! a response.

use std::io;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use surf_core::LaunchOptions;
use surf_protocol::{looks_like_http, parse_command, Action, Response, UNKNOWN_ID};
use surf_state::write_state_file;

use crate::context::DaemonContext;
use crate::manager::Manager;
use crate::server::{BoxedReader, BoxedWriter, SharedManager};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    ctx: Arc<DaemonContext>,
    manager: SharedManager,
    shutdown: ShutdownCoordinator,
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: BoxedReader,
        writer: BoxedWriter,
        ctx: Arc<DaemonContext>,
        manager: SharedManager,
        shutdown: ShutdownCoordinator,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            ctx,
            manager,
            shutdown,
            connection_number,
        }
    }

    /// Runs the connection until the client disconnects, an HTTP probe is
    /// detected, or a close command shuts the daemon down.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "Client connected");
        let mut first_data = true;

        loop {
            let mut line = String::new();
            let bytes = match self.reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(e) => {
                    debug!(
                        connection = self.connection_number,
                        error = %e,
                        "Read failed"
                    );
                    break;
                }
            };
            if bytes == 0 {
                break;
            }

            if first_data {
                first_data = false;
                // A browser fetch() probing the endpoint cross-origin opens
                // with an HTTP request line. Destroy the connection without
                // answering; any response would leak reachability.
                if looks_like_http(&line) {
                    warn!(
                        connection = self.connection_number,
                        "HTTP request on automation socket, destroying connection"
                    );
                    return;
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let (response, close_daemon) = self.handle_line(trimmed).await;
            if let Err(e) = self.send(&response).await {
                debug!(
                    connection = self.connection_number,
                    error = %e,
                    "Write failed"
                );
                break;
            }

            if close_daemon {
                // The response is already flushed; everything else happens
                // in the server's shutdown path.
                self.shutdown.request(ShutdownReason::CloseCommand);
                break;
            }
        }

        debug!(connection = self.connection_number, "Client disconnected");
    }

    /// Handles one request line. Returns the response and whether the whole
    /// daemon should shut down afterwards.
    async fn handle_line(&mut self, line: &str) -> (Response, bool) {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(failure) => {
                debug!(error = %failure, "Rejected request frame");
                let id = failure.id.clone().unwrap_or_else(|| UNKNOWN_ID.to_string());
                return (Response::err(id, failure.reason), false);
            }
        };

        let id = command.id.clone();
        match command.action {
            Action::DeviceList => {
                // Served without launching a session.
                let mut manager = self.manager.lock().await;
                match manager.list_devices().await {
                    Ok(data) => (Response::ok(id, data), false),
                    Err(e) => (Response::err(id, e.to_string()), false),
                }
            }

            Action::Launch => {
                let options = self.launch_options(Some(&command.payload));
                let mut manager = self.manager.lock().await;
                match manager.launch(&options).await {
                    Ok(mut data) => {
                        if let Some(map) = data.as_object_mut() {
                            map.insert("launched".to_string(), json!(true));
                        }
                        (Response::ok(id, data), false)
                    }
                    Err(e) => (Response::err(id, e.to_string()), false),
                }
            }

            Action::Close => {
                let mut manager = self.manager.lock().await;
                self.save_state(&mut **manager).await;
                if let Err(e) = manager.close().await {
                    // Shutdown proceeds regardless; the backend is torn down
                    // again (idempotently) in the server cleanup path.
                    warn!(error = %e, "Backend close failed");
                }
                (Response::ok(id, json!({"closed": true})), true)
            }

            Action::Automation(_) => {
                let mut manager = self.manager.lock().await;

                if !manager.is_launched() {
                    info!(
                        action = command.action.as_str(),
                        "Auto-launching backend for automation command"
                    );
                    let options = self.launch_options(None);
                    if let Err(e) = manager.launch(&options).await {
                        return (Response::err(id, e.to_string()), false);
                    }
                } else if !manager.has_pages().await {
                    debug!("All pages closed, recovering one");
                    if let Err(e) = manager.ensure_page().await {
                        return (Response::err(id, e.to_string()), false);
                    }
                }

                match manager.execute(&command).await {
                    Ok(data) => (Response::ok(id, data), false),
                    Err(e) => (Response::err(id, e.to_string()), false),
                }
            }
        }
    }

    /// Resolves effective launch options: environment defaults, optional
    /// per-request overrides, then the auto-persisted state file when the
    /// request named no storage state of its own.
    fn launch_options(&self, overrides: Option<&Value>) -> LaunchOptions {
        let mut options = self.ctx.launch.clone();
        if let Some(payload) = overrides {
            options.apply_overrides(payload);
        }
        if options.storage_state.is_none() && options.auto_state_file.is_none() {
            if let Some(path) = self.ctx.auto_state_load_path() {
                options.auto_state_file = Some(path.display().to_string());
            }
        }
        options
    }

    /// Best-effort persistence of the session's storage state. Failures are
    /// logged, never fatal: a close must still shut the daemon down.
    async fn save_state(&self, manager: &mut dyn Manager) {
        if !manager.is_launched() {
            return;
        }
        let Some(path) = self.ctx.auto_state_path() else {
            return;
        };

        match manager.storage_state().await {
            Ok(state) => match write_state_file(&path, &state, self.ctx.key.as_ref()) {
                Ok(encrypted) => {
                    if self.ctx.config.debug {
                        info!(file = %path.display(), encrypted, "Auto-saved session state");
                    } else {
                        debug!(file = %path.display(), encrypted, "Auto-saved session state");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to persist session state"),
            },
            Err(e) => warn!(error = %e, "Failed to capture storage state"),
        }
    }

    async fn send(&mut self, response: &Response) -> io::Result<()> {
        self.writer.write_all(response.to_line().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

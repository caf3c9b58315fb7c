//! Socket server for the surf daemon.
//!
//! The server:
//! - Cleans stale addressing artifacts and expired state files on startup
//! - Binds the session's Unix socket (loopback TCP on other hosts)
//! - Writes the PID file that marks the session as running
//! - Spawns a ConnectionHandler per client
//! - Tears everything down when the shutdown coordinator fires

mod connection;

pub use connection::ConnectionHandler;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use surf_core::addressing::{ensure_private_dir, Endpoint};
use surf_state::cleanup_expired_states_in;

use crate::context::DaemonContext;
use crate::manager::Manager;
use crate::shutdown::ShutdownCoordinator;

/// Manager shared across connections; commands are serialized through the
/// lock so the backend only ever sees one action at a time.
pub type SharedManager = Arc<Mutex<Box<dyn Manager>>>;

// Sync is required so connection futures holding these across await points
// stay Send for tokio::spawn.
pub type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

enum Listener {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn accept(&self) -> std::io::Result<(BoxedReader, BoxedWriter)> {
        match self {
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            Listener::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }
}

/// Errors that can occur in server setup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {endpoint}: {error}")]
    Bind { endpoint: String, error: String },

    #[error("failed to prepare {path}: {error}")]
    Setup { path: PathBuf, error: String },
}

/// The daemon's accept loop and lifecycle owner.
pub struct DaemonServer {
    ctx: Arc<DaemonContext>,
    manager: SharedManager,
    shutdown: ShutdownCoordinator,
    connection_counter: AtomicU64,
}

impl DaemonServer {
    pub fn new(
        ctx: Arc<DaemonContext>,
        manager: Box<dyn Manager>,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            ctx,
            manager: Arc::new(Mutex::new(manager)),
            shutdown,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Runs the server until shutdown.
    ///
    /// Cleans up addressing artifacts on every exit path, including bind
    /// failure, so a dead daemon never leaves a session looking alive.
    pub async fn run(&self) -> Result<(), ServerError> {
        let paths = &self.ctx.paths;

        ensure_private_dir(paths.dir()).map_err(|e| ServerError::Setup {
            path: paths.dir().to_path_buf(),
            error: e.to_string(),
        })?;

        // A previous daemon that crashed leaves its socket and PID files
        // behind; the startup check already proved that process is gone.
        paths.cleanup();

        let expired = cleanup_expired_states_in(&self.ctx.sessions_dir, self.ctx.config.expire_days);
        if !expired.is_empty() {
            info!(count = expired.len(), "Removed expired session state files");
        }

        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                paths.cleanup();
                return Err(e);
            }
        };

        if let Some(port) = self.ctx.config.stream_port {
            if let Err(e) = fs::write(paths.stream_port_file(), port.to_string()) {
                warn!(error = %e, "Failed to write stream port file");
            }
        }

        if let Err(e) = paths.write_pid_file() {
            paths.cleanup();
            return Err(ServerError::Setup {
                path: paths.pid_file(),
                error: e.to_string(),
            });
        }

        info!(
            session = %self.ctx.config.session,
            socket = %paths.socket_path().display(),
            "Daemon listening"
        );

        let cancel = self.shutdown.token();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((reader, writer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(reader, writer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep serving other clients.
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    fn bind(&self) -> Result<Listener, ServerError> {
        match self.ctx.paths.endpoint() {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let listener = UnixListener::bind(&path).map_err(|e| ServerError::Bind {
                    endpoint: path.display().to_string(),
                    error: e.to_string(),
                })?;
                Ok(Listener::Unix(listener))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(ServerError::Bind {
                endpoint: path.display().to_string(),
                error: "unix sockets are not supported on this host".to_string(),
            }),
            Endpoint::Tcp(port) => {
                let listener = bind_loopback(port).map_err(|e| ServerError::Bind {
                    endpoint: format!("127.0.0.1:{port}"),
                    error: e.to_string(),
                })?;
                // Clients on this platform read the port file rather than
                // recomputing the hash.
                if let Err(e) = fs::write(self.ctx.paths.port_file(), port.to_string()) {
                    warn!(error = %e, "Failed to write port file");
                }
                Ok(Listener::Tcp(listener))
            }
        }
    }

    fn handle_connection(&self, reader: BoxedReader, writer: BoxedWriter, connection_number: u64) {
        let ctx = Arc::clone(&self.ctx);
        let manager = Arc::clone(&self.manager);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let handler =
                ConnectionHandler::new(reader, writer, ctx, manager, shutdown, connection_number);
            handler.run().await;
        });
    }

    /// Performs cleanup on shutdown.
    async fn cleanup(&self) {
        {
            let mut manager = self.manager.lock().await;
            if let Err(e) = manager.close().await {
                warn!(error = %e, "Failed to close automation backend");
            }
        }

        self.ctx.paths.cleanup();
        info!("Server cleanup complete");
    }
}

/// Binds a std listener in blocking mode then converts, so `bind` stays a
/// sync function callable before the accept loop.
fn bind_loopback(port: u16) -> std::io::Result<TcpListener> {
    let std_listener = std::net::TcpListener::bind(("127.0.0.1", port))?;
    std_listener.set_nonblocking(true)?;
    TcpListener::from_std(std_listener)
}

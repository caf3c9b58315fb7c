//! Graceful shutdown coordination.
//!
//! Shutdown can come from a `close` command, a termination signal, or a
//! fatal server error. All paths funnel into one [`ShutdownCoordinator`] so
//! cleanup runs exactly once and concurrent triggers collapse into the
//! first.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use surf_core::SessionPaths;

/// Why the daemon is going down; recorded in the shutdown log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A client sent the `close` command.
    CloseCommand,
    /// A termination signal arrived.
    Signal(&'static str),
    /// The server hit an unrecoverable error.
    Fatal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::CloseCommand => write!(f, "close command"),
            ShutdownReason::Signal(name) => write!(f, "signal {name}"),
            ShutdownReason::Fatal => write!(f, "fatal error"),
        }
    }
}

/// One-shot shutdown fan-in shared by signal handlers and connections.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    begun: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            begun: Arc::new(AtomicBool::new(false)),
            fatal: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
        }
    }

    /// Token the accept loop selects on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests shutdown. Returns true only for the first caller; later
    /// triggers are ignored so cleanup never runs twice.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        if matches!(reason, ShutdownReason::Fatal) {
            // Recorded even when shutdown is already in progress: the exit
            // code must reflect the failure.
            self.fatal.store(true, Ordering::SeqCst);
        }
        if self.begun.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(reason = %reason, "Shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.begun.load(Ordering::SeqCst)
    }

    /// True once any trigger reported an unrecoverable error. The daemon
    /// still tears down gracefully but must exit non-zero.
    pub fn fatal_occurred(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a panic hook that removes the session's addressing artifacts
/// and forces the daemon down. A panic in any task means the process can no
/// longer be trusted to serve, so it must stop looking alive immediately
/// and then terminate with a failure status instead of limping on.
pub fn install_crash_handler(paths: SessionPaths, coordinator: ShutdownCoordinator) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        paths.cleanup();
        coordinator.request(ShutdownReason::Fatal);
        default_hook(panic_info);
    }));
}

/// Spawns the task that turns termination signals into a shutdown request.
pub fn spawn_signal_listener(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                coordinator.request(ShutdownReason::Signal(name));
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        _ = sighup.recv() => "SIGHUP",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

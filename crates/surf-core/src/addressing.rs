//! Session addressing: where a daemon's socket, PID, and port files live.
//!
//! One daemon process exists per session id. The presence of the PID file
//! (backed by a liveness probe of the recorded PID) is the sole signal that
//! a daemon is running; everything here is built so a crashed daemon's
//! stale artifacts are detected and removed on the next lookup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ENV_SOCKET_DIR;
use crate::session::SessionId;

/// Directory name used under XDG runtime, home, and temp locations.
const APP_DIR_NAME: &str = "surf";

/// Dot-folder used in the home directory.
const HOME_DIR_NAME: &str = ".surf";

/// Dynamic/private port range base for TCP fallback (49152-65535).
const PORT_RANGE_BASE: u16 = 49152;
const PORT_RANGE_SPAN: u32 = 16383;

/// Resolves the directory holding socket/PID/port files.
///
/// Priority: `SURF_SOCKET_DIR` > `$XDG_RUNTIME_DIR/surf` > `~/.surf` >
/// `$TMPDIR/surf`.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_SOCKET_DIR) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        if !runtime.is_empty() {
            return PathBuf::from(runtime).join(APP_DIR_NAME);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(HOME_DIR_NAME);
    }

    std::env::temp_dir().join(APP_DIR_NAME)
}

/// Resolves the per-user data directory (persisted session state lives in
/// `data_dir()/sessions`).
pub fn data_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        return home.join(HOME_DIR_NAME);
    }
    std::env::temp_dir().join(APP_DIR_NAME)
}

/// Creates `dir` (and parents) with owner-only permissions.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// How a client reaches a daemon for a given session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path (POSIX hosts).
    Unix(PathBuf),
    /// Loopback TCP port (hosts without Unix sockets).
    Tcp(u16),
}

/// Filesystem addressing for one session, rooted at an explicit directory.
///
/// Constructed once and threaded through the daemon instead of consulting
/// globals, so tests can point it at a temp dir.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    dir: PathBuf,
    session: SessionId,
}

impl SessionPaths {
    pub fn new(dir: impl Into<PathBuf>, session: SessionId) -> Self {
        Self {
            dir: dir.into(),
            session,
        }
    }

    /// Addressing rooted at the environment-resolved runtime directory.
    pub fn from_env(session: SessionId) -> Self {
        Self::new(runtime_dir(), session)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.join(format!("{}.sock", self.session))
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(format!("{}.pid", self.session))
    }

    /// Port file advertising the TCP port on hosts without Unix sockets.
    pub fn port_file(&self) -> PathBuf {
        self.dir.join(format!("{}.port", self.session))
    }

    /// Port file advertising the preview/stream server, when enabled.
    pub fn stream_port_file(&self) -> PathBuf {
        self.dir.join(format!("{}.stream", self.session))
    }

    /// Deterministic TCP port for this session, folded into the
    /// dynamic/private range.
    ///
    /// The hash must stay in lockstep with clients that recompute it
    /// instead of reading the port file: `h = (h << 5) - h + byte` over the
    /// session id, on wrapping 32-bit signed arithmetic.
    pub fn port(&self) -> u16 {
        let mut hash: i32 = 0;
        for byte in self.session.as_str().bytes() {
            hash = hash
                .wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(byte as i32);
        }
        PORT_RANGE_BASE + (hash.unsigned_abs() % PORT_RANGE_SPAN) as u16
    }

    /// Platform-appropriate connection descriptor for this session.
    pub fn endpoint(&self) -> Endpoint {
        #[cfg(unix)]
        {
            Endpoint::Unix(self.socket_path())
        }
        #[cfg(not(unix))]
        {
            Endpoint::Tcp(self.port())
        }
    }

    /// Writes the current process id to the PID file.
    pub fn write_pid_file(&self) -> io::Result<()> {
        fs::write(self.pid_file(), std::process::id().to_string())
    }

    /// Reads the PID recorded for this session, if any.
    pub fn read_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(self.pid_file()).ok()?;
        contents.trim().parse().ok()
    }

    /// Returns true iff a PID file exists and the recorded process is
    /// alive. A stale PID file (process gone, or contents unreadable) is
    /// cleaned up as a side effect before returning false.
    pub fn is_daemon_running(&self) -> bool {
        let Some(pid) = self.read_pid() else {
            if self.pid_file().exists() {
                debug!(session = %self.session, "Unreadable PID file, cleaning up");
                self.cleanup();
            }
            return false;
        };
        if process_alive(pid) {
            return true;
        }
        debug!(session = %self.session, pid, "Stale PID file detected, cleaning up");
        self.cleanup();
        false
    }

    /// Best-effort removal of all addressing artifacts for this session.
    ///
    /// Runs on shutdown paths including crash handlers, so it swallows I/O
    /// errors instead of propagating them.
    pub fn cleanup(&self) {
        let _ = fs::remove_file(self.pid_file());
        let _ = fs::remove_file(self.stream_port_file());
        let _ = fs::remove_file(self.socket_path());
        let _ = fs::remove_file(self.port_file());
    }
}

/// Zero-effect liveness probe for a process id.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Signal 0 performs permission and existence checks without delivery.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
        true,
        ProcessRefreshKind::new(),
    );
    system.process(Pid::from_u32(pid)).is_some()
}

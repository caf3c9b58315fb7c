//! Shared daemon context assembled once at startup.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use surf_core::{DaemonConfig, LaunchOptions, SessionPaths};
use surf_state::{auto_state_file_path_in, encryption_key_from_env, EncryptionKey};

/// Everything the daemon reads from its environment, resolved once and
/// threaded through the server so connections never consult globals.
#[derive(Debug)]
pub struct DaemonContext {
    pub config: DaemonConfig,
    /// Environment-derived launch defaults; explicit `launch` payloads
    /// override individual fields per request.
    pub launch: LaunchOptions,
    pub paths: SessionPaths,
    /// Directory holding persisted state files.
    pub sessions_dir: PathBuf,
    /// Encryption key for state at rest, when configured.
    pub key: Option<EncryptionKey>,
}

impl DaemonContext {
    pub fn new(
        config: DaemonConfig,
        launch: LaunchOptions,
        paths: SessionPaths,
        sessions_dir: PathBuf,
        key: Option<EncryptionKey>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            launch,
            paths,
            sessions_dir,
            key,
        })
    }

    /// Builds the context from process environment.
    pub fn from_env() -> Arc<Self> {
        let config = DaemonConfig::from_env();
        let launch = LaunchOptions::from_env();
        let paths = SessionPaths::from_env(config.session.clone());
        let sessions_dir = surf_state::sessions_dir();
        let key = encryption_key_from_env();
        Self::new(config, launch, paths, sessions_dir, key)
    }

    /// Path of the auto-persisted state file for this session, or `None`
    /// when no session name is configured (auto-persist disabled).
    pub fn auto_state_path(&self) -> Option<PathBuf> {
        let name = self.config.session_name.as_ref()?;
        match auto_state_file_path_in(&self.sessions_dir, name.as_str(), self.config.session.as_str())
        {
            Ok(path) => path,
            Err(e) => {
                // Name and id are pre-validated, so this only fires on a
                // genuinely hostile environment.
                warn!(error = %e, "Refusing auto-state path");
                None
            }
        }
    }

    /// Auto-state path only if the file already exists (used at launch to
    /// restore a previous session).
    pub fn auto_state_load_path(&self) -> Option<PathBuf> {
        self.auto_state_path().filter(|path| path.exists())
    }
}

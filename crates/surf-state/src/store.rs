//! Reading, writing, and expiring persisted state files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tracing::debug;

use surf_core::addressing::{data_dir, ensure_private_dir};
use surf_core::session::{SessionId, SessionName};

use crate::crypto::{decrypt, encrypt, is_encrypted_payload, EncryptedPayload, EncryptionKey};
use crate::error::{StateError, StateResult};

/// Returns the sessions directory (`~/.surf/sessions`).
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

/// Ensures the sessions directory exists with owner-only permissions.
pub fn ensure_sessions_dir() -> StateResult<PathBuf> {
    let dir = sessions_dir();
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Resolves the auto-save state file path for a session inside `dir`.
///
/// Returns `Ok(None)` when `session_name` is empty (auto-persist disabled).
/// Both components are validated; the joined path is additionally checked
/// to remain inside `dir` since both values can originate from environment
/// variables the daemon does not trust.
pub fn auto_state_file_path_in(
    dir: &Path,
    session_name: &str,
    session_id: &str,
) -> StateResult<Option<PathBuf>> {
    if session_name.is_empty() {
        return Ok(None);
    }

    let name = SessionName::parse(session_name)?;
    let id = SessionId::parse(session_id)?;

    let path = dir.join(format!("{name}-{id}.json"));
    if path.parent() != Some(dir) {
        return Err(StateError::PathEscape {
            path: path.display().to_string(),
        });
    }
    Ok(Some(path))
}

/// Resolves the auto-save state file path under the default sessions
/// directory, creating it if needed.
pub fn auto_state_file_path(session_name: &str, session_id: &str) -> StateResult<Option<PathBuf>> {
    if session_name.is_empty() {
        return Ok(None);
    }
    let dir = ensure_sessions_dir()?;
    auto_state_file_path_in(&dir, session_name, session_id)
}

/// Writes state to `path`, encrypting when a key is configured.
///
/// Returns whether the file was encrypted. The file mode is restricted to
/// owner read/write after writing since state holds live credentials.
pub fn write_state_file(
    path: &Path,
    data: &Value,
    key: Option<&EncryptionKey>,
) -> StateResult<bool> {
    let json = serde_json::to_string_pretty(data)?;

    let encrypted = match key {
        Some(key) => {
            let payload = encrypt(json.as_bytes(), key)?;
            fs::write(path, serde_json::to_string_pretty(&payload)?)?;
            true
        }
        None => {
            fs::write(path, json)?;
            false
        }
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(encrypted)
}

/// Reads state from `path`, decrypting when it carries an envelope.
///
/// Returns the state and whether it was encrypted on disk. An envelope
/// with no key configured is `StateError::MissingKey`, which callers
/// surface as an actionable message rather than an I/O failure.
pub fn read_state_file(path: &Path, key: Option<&EncryptionKey>) -> StateResult<(Value, bool)> {
    let contents = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&contents)?;

    if !is_encrypted_payload(&parsed) {
        return Ok((parsed, false));
    }

    let key = key.ok_or(StateError::MissingKey)?;
    let payload: EncryptedPayload = serde_json::from_value(parsed)?;
    let plaintext = decrypt(&payload, key)?;
    let state: Value = serde_json::from_slice(&plaintext)?;
    Ok((state, true))
}

/// Lists state file names (`*.json`) in `dir`.
pub fn list_state_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".json"))
        .collect();
    files.sort();
    files
}

/// Deletes state files in `dir` older than `max_age_days`.
///
/// Returns the deleted filenames. A non-positive age is a no-op returning
/// an empty list; it never means "delete everything".
pub fn cleanup_expired_states_in(dir: &Path, max_age_days: i64) -> Vec<String> {
    cleanup_expired_states_at(dir, max_age_days, SystemTime::now())
}

/// Expiry cleanup under the default sessions directory.
pub fn cleanup_expired_states(max_age_days: i64) -> Vec<String> {
    cleanup_expired_states_in(&sessions_dir(), max_age_days)
}

fn cleanup_expired_states_at(dir: &Path, max_age_days: i64, now: SystemTime) -> Vec<String> {
    if max_age_days <= 0 {
        return Vec::new();
    }

    let max_age = Duration::from_secs(max_age_days as u64 * 24 * 60 * 60);
    let mut deleted = Vec::new();

    for name in list_state_files(dir) {
        let path = dir.join(&name);
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let expired = now
            .duration_since(modified)
            .map(|age| age > max_age)
            .unwrap_or(false);
        if expired && fs::remove_file(&path).is_ok() {
            debug!(file = %name, "Expired state file removed");
            deleted.push(name);
        }
    }

    deleted
}

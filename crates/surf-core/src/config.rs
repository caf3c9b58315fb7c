//! Environment configuration surface for the daemon.
//!
//! All configuration arrives through `SURF_*` environment variables set by
//! the client that spawned the daemon. Parsing is factored through a lookup
//! function so tests can feed values without mutating process environment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::{SessionId, SessionName};

pub const ENV_SESSION: &str = "SURF_SESSION";
pub const ENV_SESSION_NAME: &str = "SURF_SESSION_NAME";
pub const ENV_SOCKET_DIR: &str = "SURF_SOCKET_DIR";
pub const ENV_STATE_EXPIRE_DAYS: &str = "SURF_STATE_EXPIRE_DAYS";
pub const ENV_STREAM_PORT: &str = "SURF_STREAM_PORT";
pub const ENV_PROVIDER: &str = "SURF_PROVIDER";
pub const ENV_DEBUG: &str = "SURF_DEBUG";
pub const ENV_DRIVER: &str = "SURF_DRIVER";

pub const ENV_HEADED: &str = "SURF_HEADED";
pub const ENV_EXECUTABLE_PATH: &str = "SURF_EXECUTABLE_PATH";
pub const ENV_EXTENSIONS: &str = "SURF_EXTENSIONS";
pub const ENV_PROFILE: &str = "SURF_PROFILE";
pub const ENV_STATE: &str = "SURF_STATE";
pub const ENV_ARGS: &str = "SURF_ARGS";
pub const ENV_USER_AGENT: &str = "SURF_USER_AGENT";
pub const ENV_PROXY: &str = "SURF_PROXY";
pub const ENV_PROXY_BYPASS: &str = "SURF_PROXY_BYPASS";
pub const ENV_IGNORE_HTTPS_ERRORS: &str = "SURF_IGNORE_HTTPS_ERRORS";
pub const ENV_ALLOW_FILE_ACCESS: &str = "SURF_ALLOW_FILE_ACCESS";

/// Default number of days before persisted state expires.
pub const DEFAULT_EXPIRE_DAYS: i64 = 30;

/// Automation backend flavor the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Desktop browser backend.
    Desktop,
    /// Mobile device / simulator backend.
    Device,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Desktop => "desktop",
            Provider::Device => "device",
        }
    }
}

/// Proxy settings forwarded to the automation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass: Option<String>,
}

/// Launch options forwarded verbatim to the `Manager` on (auto-)launch.
///
/// Serialized camelCase because that is the driver wire convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchOptions {
    pub headless: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Explicit storage-state file requested by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    pub ignore_https_errors: bool,
    pub allow_file_access: bool,
    /// Auto-persisted session state discovered by the daemon; filled in at
    /// launch time, never taken from the environment directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_state_file: Option<String>,
}

impl LaunchOptions {
    /// Builds launch options from process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds launch options from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let proxy = lookup(ENV_PROXY)
            .filter(|s| !s.is_empty())
            .map(|server| ProxyConfig {
                server,
                bypass: lookup(ENV_PROXY_BYPASS).filter(|s| !s.is_empty()),
            });

        Self {
            headless: !flag(&lookup, ENV_HEADED),
            executable_path: lookup(ENV_EXECUTABLE_PATH).filter(|s| !s.is_empty()),
            extensions: split_list(lookup(ENV_EXTENSIONS).as_deref().unwrap_or(""), &[',']),
            profile: lookup(ENV_PROFILE).filter(|s| !s.is_empty()),
            storage_state: lookup(ENV_STATE).filter(|s| !s.is_empty()),
            args: split_list(lookup(ENV_ARGS).as_deref().unwrap_or(""), &[',', '\n']),
            user_agent: lookup(ENV_USER_AGENT).filter(|s| !s.is_empty()),
            proxy,
            ignore_https_errors: flag(&lookup, ENV_IGNORE_HTTPS_ERRORS),
            allow_file_access: flag(&lookup, ENV_ALLOW_FILE_ACCESS),
            auto_state_file: None,
        }
    }

    /// Applies field overrides from an explicit `launch` request payload.
    ///
    /// Only fields present in the payload replace environment-derived
    /// values; everything else is left alone.
    pub fn apply_overrides(&mut self, payload: &serde_json::Value) {
        if let Some(headless) = payload.get("headless").and_then(|v| v.as_bool()) {
            self.headless = headless;
        }
        if let Some(v) = payload.get("executablePath").and_then(|v| v.as_str()) {
            self.executable_path = Some(v.to_string());
        }
        if let Some(v) = payload.get("profile").and_then(|v| v.as_str()) {
            self.profile = Some(v.to_string());
        }
        if let Some(v) = payload.get("storageState").and_then(|v| v.as_str()) {
            self.storage_state = Some(v.to_string());
        }
        if let Some(v) = payload.get("userAgent").and_then(|v| v.as_str()) {
            self.user_agent = Some(v.to_string());
        }
        if let Some(v) = payload.get("autoStateFilePath").and_then(|v| v.as_str()) {
            self.auto_state_file = Some(v.to_string());
        }
        if let Some(items) = payload.get("extensions").and_then(|v| v.as_array()) {
            self.extensions = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        if let Some(items) = payload.get("args").and_then(|v| v.as_array()) {
            self.args = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
    }
}

/// Daemon-level configuration read once at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub session: SessionId,
    /// Gates auto-persisted state. An invalid name from the environment is
    /// rejected (logged), not silently sanitized.
    pub session_name: Option<SessionName>,
    pub expire_days: i64,
    pub stream_port: Option<u16>,
    pub provider: Provider,
    pub debug: bool,
}

impl DaemonConfig {
    /// Reads daemon configuration from process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads daemon configuration from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let session = match lookup(ENV_SESSION) {
            Some(raw) if !raw.is_empty() => match SessionId::parse(raw) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "Invalid {ENV_SESSION}, falling back to default session");
                    SessionId::default_id()
                }
            },
            _ => SessionId::default_id(),
        };

        let session_name = lookup(ENV_SESSION_NAME)
            .filter(|s| !s.is_empty())
            .and_then(|raw| match SessionName::parse(raw) {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!(error = %e, "Rejected invalid session name from environment");
                    None
                }
            });

        let expire_days = lookup(ENV_STATE_EXPIRE_DAYS)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_EXPIRE_DAYS);

        let stream_port = lookup(ENV_STREAM_PORT)
            .and_then(|s| s.trim().parse::<u16>().ok())
            .filter(|p| *p > 0);

        let provider = match lookup(ENV_PROVIDER).as_deref() {
            Some("device") | Some("ios") => Provider::Device,
            _ => Provider::Desktop,
        };

        Self {
            session,
            session_name,
            expire_days,
            stream_port,
            provider,
            debug: flag(&lookup, ENV_DEBUG),
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    lookup(key).as_deref() == Some("1")
}

fn split_list(raw: &str, separators: &[char]) -> Vec<String> {
    raw.split(separators)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_lookup(|_| None);
        assert_eq!(config.session.as_str(), "default");
        assert!(config.session_name.is_none());
        assert_eq!(config.expire_days, DEFAULT_EXPIRE_DAYS);
        assert_eq!(config.provider, Provider::Desktop);
        assert!(!config.debug);
        assert!(config.stream_port.is_none());
    }

    #[test]
    fn test_invalid_session_name_rejected_not_sanitized() {
        let config = DaemonConfig::from_lookup(lookup_from(&[(ENV_SESSION_NAME, "../evil")]));
        assert!(config.session_name.is_none());
    }

    #[test]
    fn test_valid_session_name_accepted() {
        let config = DaemonConfig::from_lookup(lookup_from(&[
            (ENV_SESSION, "agent1"),
            (ENV_SESSION_NAME, "twitter"),
        ]));
        assert_eq!(config.session.as_str(), "agent1");
        assert_eq!(config.session_name.unwrap().as_str(), "twitter");
    }

    #[test]
    fn test_provider_parsing() {
        let config = DaemonConfig::from_lookup(lookup_from(&[(ENV_PROVIDER, "device")]));
        assert_eq!(config.provider, Provider::Device);
        let config = DaemonConfig::from_lookup(lookup_from(&[(ENV_PROVIDER, "desktop")]));
        assert_eq!(config.provider, Provider::Desktop);
    }

    #[test]
    fn test_launch_options_defaults_to_headless() {
        let options = LaunchOptions::from_lookup(|_| None);
        assert!(options.headless);
        let options = LaunchOptions::from_lookup(lookup_from(&[(ENV_HEADED, "1")]));
        assert!(!options.headless);
    }

    #[test]
    fn test_launch_options_lists() {
        let options = LaunchOptions::from_lookup(lookup_from(&[
            (ENV_EXTENSIONS, "/a/ext1, /b/ext2 ,"),
            (ENV_ARGS, "--no-sandbox,--lang=en\n--mute-audio"),
        ]));
        assert_eq!(options.extensions, vec!["/a/ext1", "/b/ext2"]);
        assert_eq!(
            options.args,
            vec!["--no-sandbox", "--lang=en", "--mute-audio"]
        );
    }

    #[test]
    fn test_launch_options_proxy() {
        let options = LaunchOptions::from_lookup(lookup_from(&[
            (ENV_PROXY, "http://proxy:8080"),
            (ENV_PROXY_BYPASS, "localhost"),
        ]));
        let proxy = options.proxy.unwrap();
        assert_eq!(proxy.server, "http://proxy:8080");
        assert_eq!(proxy.bypass.as_deref(), Some("localhost"));

        let options = LaunchOptions::from_lookup(|_| None);
        assert!(options.proxy.is_none());
    }

    #[test]
    fn test_apply_overrides() {
        let mut options = LaunchOptions::from_lookup(|_| None);
        options.apply_overrides(&serde_json::json!({
            "headless": false,
            "executablePath": "/opt/chromium",
            "args": ["--disable-gpu"],
        }));
        assert!(!options.headless);
        assert_eq!(options.executable_path.as_deref(), Some("/opt/chromium"));
        assert_eq!(options.args, vec!["--disable-gpu"]);
        // Untouched fields keep their values
        assert!(options.user_agent.is_none());
    }

    #[test]
    fn test_launch_options_wire_shape() {
        let options = LaunchOptions {
            headless: true,
            user_agent: Some("surf-test".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["headless"], true);
        assert_eq!(json["userAgent"], "surf-test");
        // Empty collections are omitted from the wire
        assert!(json.get("extensions").is_none());
    }

    #[test]
    fn test_expire_days_parsing() {
        let config = DaemonConfig::from_lookup(lookup_from(&[(ENV_STATE_EXPIRE_DAYS, "7")]));
        assert_eq!(config.expire_days, 7);
        let config = DaemonConfig::from_lookup(lookup_from(&[(ENV_STATE_EXPIRE_DAYS, "junk")]));
        assert_eq!(config.expire_days, DEFAULT_EXPIRE_DAYS);
    }
}

//! Surf Core - Shared types for the surf browser session daemon
//!
//! This crate provides the leaf building blocks shared between the
//! daemon (surfd) and any client that needs to locate a running session:
//! - `session` - validated session identifiers
//! - `config` - the environment configuration surface
//! - `addressing` - socket/PID/port file layout and liveness checks
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()` outside of tests.

pub mod addressing;
pub mod config;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use addressing::{data_dir, runtime_dir, Endpoint, SessionPaths};
pub use config::{DaemonConfig, LaunchOptions, Provider, ProxyConfig};
pub use error::{DomainError, DomainResult};
pub use session::{SessionId, SessionName};

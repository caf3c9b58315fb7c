//! surfd - the per-session browser automation daemon.
//!
//! One daemon process owns one browser session. Clients connect over a Unix
//! socket (loopback TCP on other hosts), send newline-delimited JSON command
//! frames, and receive one response frame per command in order. The daemon
//! persists session state (cookies, storage) across restarts and shuts down
//! on a `close` command or a termination signal.
//!
//! # Panic-Free Policy
//!
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! outside of tests. All fallible operations use `?`, pattern matching, or
//! logged fallbacks; connection errors never take the daemon down.

pub mod cli;
pub mod context;
pub mod driver;
pub mod manager;
pub mod server;
pub mod shutdown;

pub use context::DaemonContext;
pub use driver::DriverManager;
pub use manager::{Manager, ManagerError};
pub use server::{DaemonServer, ServerError};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};

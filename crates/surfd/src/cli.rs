//! Command-line entry point for `surfd`.
//!
//! ```bash
//! # Start the daemon for the default session (foreground)
//! surfd start
//!
//! # Start in the background for a named session
//! SURF_SESSION=agent1 surfd start -d
//!
//! # Stop / inspect a session's daemon
//! SURF_SESSION=agent1 surfd stop
//! SURF_SESSION=agent1 surfd status
//!
//! # Enable debug logging
//! SURF_DEBUG=1 surfd start
//! ```

use std::process;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use surf_core::addressing::Endpoint;
use surf_core::{DaemonConfig, SessionPaths};

use crate::context::DaemonContext;
use crate::driver::DriverManager;
use crate::server::DaemonServer;
use crate::shutdown::{install_crash_handler, spawn_signal_listener, ShutdownCoordinator};

/// surf daemon - per-session browser automation server
#[derive(Parser, Debug)]
#[command(name = "surfd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon for the configured session
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    // Default to 'start' when invoked bare, since clients spawn the daemon
    // without a subcommand.
    let command = args.command.unwrap_or(Command::Start { daemon: false });

    let config = DaemonConfig::from_env();
    let paths = SessionPaths::from_env(config.session.clone());

    match command {
        Command::Start { daemon } => {
            if paths.is_daemon_running() {
                let pid = paths.read_pid().unwrap_or(0);
                eprintln!(
                    "Daemon for session '{}' is already running (PID {pid})",
                    config.session
                );
                eprintln!("Use 'surfd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Fork before the tokio runtime exists.
                daemonize(&paths)?;
            }

            run_daemon()
        }

        Command::Stop => {
            if !paths.is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }
            let Some(pid) = paths.read_pid() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon for session '{}' (PID {pid})...", config.session);
            send_sigterm(pid)?;

            // Wait up to 5 seconds for the process to exit.
            for _ in 0..50 {
                if !paths.is_daemon_running() {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(100));
            }

            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }

        Command::Status => {
            if paths.is_daemon_running() {
                let pid = paths.read_pid().unwrap_or(0);
                println!(
                    "Daemon for session '{}' is running (PID {pid})",
                    config.session
                );
                match paths.endpoint() {
                    Endpoint::Unix(socket) => println!("Socket: {}", socket.display()),
                    Endpoint::Tcp(port) => println!("Port: {port}"),
                }
                if let Ok(stream) = std::fs::read_to_string(paths.stream_port_file()) {
                    println!("Stream port: {}", stream.trim());
                }
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Sends SIGTERM to the daemon process.
fn send_sigterm(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        bail!("Stop command is only supported on Unix systems");
    }
}

/// Daemonizes the current process, redirecting output to a per-session log
/// file next to the socket.
#[cfg(unix)]
fn daemonize(paths: &SessionPaths) -> Result<()> {
    use anyhow::Context;
    use daemonize::Daemonize;
    use std::fs::File;

    surf_core::addressing::ensure_private_dir(paths.dir())
        .context("Failed to create runtime directory")?;

    let log_path = paths.dir().join(format!("{}.log", paths.session()));
    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[cfg(not(unix))]
fn daemonize(_paths: &SessionPaths) -> Result<()> {
    bail!("Background mode is only supported on Unix systems")
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon() -> Result<()> {
    let ctx = DaemonContext::from_env();

    let level = if ctx.config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("surfd={level}").parse()?)
                .add_directive(format!("surf_core={level}").parse()?)
                .add_directive(format!("surf_protocol={level}").parse()?)
                .add_directive(format!("surf_state={level}").parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        session = %ctx.config.session,
        "surf daemon starting"
    );

    let shutdown = ShutdownCoordinator::new();

    // A panic must not leave the session looking alive or the process
    // limping on without its artifacts.
    install_crash_handler(ctx.paths.clone(), shutdown.clone());

    if let Err(e) = surf_state::ensure_sessions_dir() {
        warn!(error = %e, "Failed to prepare sessions directory");
    }

    spawn_signal_listener(shutdown.clone());

    let manager = Box::new(DriverManager::from_env(ctx.config.provider));
    let server = DaemonServer::new(ctx, manager, shutdown.clone());

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    if shutdown.fatal_occurred() {
        bail!("daemon stopped after a fatal error");
    }

    info!("surf daemon stopped");
    Ok(())
}

/// Date MCP Server Entry Point
///
/// Serves the `get_day_name` and `get_iso_date` tools over STDIO until stdin
/// closes or the process receives SIGINT/SIGTERM. Both cases exit with
/// status 0; a failure to start the runtime or the transport exits non-zero.
///
/// Environment Variables (all optional):
/// - SERVER_NAME: Name of the server (default: "date")
/// - SERVER_VERSION: Version string (default: crate version)
/// - RUST_LOG: Log filter for stderr logging (default: "info")

mod core;
mod tools;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::config::{DEFAULT_LOG_FILTER, ServerConfig};
use crate::core::server;

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(&config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(serve(config));

    // A pending stdin read occupies a blocking thread that cannot be
    // interrupted, so don't wait for it after a signal.
    runtime.shutdown_background();
    result
}

/// Log to stderr only; stdout carries the JSON-RPC stream.
///
/// An unparseable filter falls back to the default level and is reported
/// once logging is up.
fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let (filter, rejected) = match EnvFilter::try_new(&config.log_filter) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_LOG_FILTER), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize logging")?;

    if let Some(e) = rejected {
        warn!(
            filter = %config.log_filter,
            error = %e,
            "ignoring invalid RUST_LOG, using \"{}\"",
            DEFAULT_LOG_FILTER
        );
    }
    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    // Handlers go in before the server starts so a signal arriving during
    // startup is still a clean shutdown.
    let mut signals = ShutdownSignals::install().context("failed to install signal handlers")?;

    tokio::select! {
        result = server::run_server_stdio(&config) => {
            result.context("stdio transport failed")?;
        }
        name = signals.recv() => {
            info!(signal = name, "shutting down");
        }
    }
    Ok(())
}

/// SIGINT and SIGTERM listeners.
#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first signal and return its name.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                warn!(error = %e, "ctrl-c listener failed");
                std::future::pending().await
            }
        }
    }
}

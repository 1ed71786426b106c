//! fsaudit - Directory tree change auditor
//!
//! Entry point for the monitoring daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use fsaudit::config::FileConfig;
use fsaudit::observability::init_tracing;
use fsaudit::session::Session;
use fsaudit::watcher::NotifyWatchSource;
use fsaudit::{Config, Result};
use tokio::signal;
use tokio::sync::mpsc;

/// fsaudit - Directory tree change auditor
#[derive(Parser, Debug)]
#[command(name = "fsaudit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory tree to monitor (absolute path)
    root: Option<std::path::PathBuf>,

    /// Absolute paths never registered as watched subtrees
    #[arg(short, long, env = "FSAUDIT_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<std::path::PathBuf>,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "FSAUDIT_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FSAUDIT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "FSAUDIT_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file = cli.config.as_deref().map(FileConfig::load).transpose()?;
    let config = Config::resolve(file, cli.root, cli.exclude, cli.log_level)?;

    init_tracing(&config.log_level, cli.log_json);

    tracing::info!("fsaudit v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let source = NotifyWatchSource::new(events_tx)?;
    let session = Session::start(&config, Box::new(source), events_rx)?;

    shutdown_signal().await;
    session.shutdown().await
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

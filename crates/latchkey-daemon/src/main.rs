//! Latchkey daemon - main entry point
//!
//! Holds the unlocked session and serves it over a Unix socket until it is
//! stopped, signalled, or left idle.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use latchkey_daemon::{Daemon, DaemonConfig, DaemonState};

#[derive(Parser, Debug)]
#[command(name = "latchkeyd", version, about = "Latchkey background daemon")]
struct Args {
    /// Configuration file (defaults to $LATCHKEY_CONFIG or the XDG config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log to the terminal instead of the configured log file
    #[arg(long)]
    foreground: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(DaemonConfig::default_path);
    let config = DaemonConfig::load_or_create(&config_path)?;
    config.ensure_directories()?;

    init_logging(&config, args.foreground)?;
    info!("Starting Latchkey daemon v{}", env!("CARGO_PKG_VERSION"));

    let daemon = Daemon::new(config);
    watch_signals(daemon.state())?;

    if !daemon.run().await? {
        info!("Another daemon is serving, exiting");
    }
    Ok(())
}

fn init_logging(config: &DaemonConfig, foreground: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "latchkey_daemon=info,latchkey_core=info".into());

    if foreground {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(log)),
            )
            .init();
    }
    Ok(())
}

/// SIGINT and SIGTERM both start a graceful shutdown
fn watch_signals(state: Arc<DaemonState>) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
            _ = terminate.recv() => info!("Received terminate signal"),
        }
        state.trigger_shutdown();
    });
    Ok(())
}

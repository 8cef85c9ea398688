//! latchkey-sync: HTTP server for signed store uploads

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use latchkey_sync::{router, RecordStore, SyncState};

#[derive(Parser, Debug)]
#[command(name = "latchkey-sync", version, about = "Remote store server for Latchkey")]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: u16,

    /// Data file holding the accepted key and payload
    #[arg(short, long, default_value = "latchkey-sync.db")]
    file: PathBuf,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    address: IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "latchkey_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting latchkey-sync v{}", env!("CARGO_PKG_VERSION"));
    let records = RecordStore::open(&args.file)?;
    let app = router(Arc::new(SyncState::new(records)));

    let addr = SocketAddr::new(args.address, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

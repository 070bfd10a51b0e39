//! DrawSync relay server binary.

use clap::Parser;
use drawsync_server::config::{DEFAULT_MAX_CONNECTIONS, DEFAULT_STORE_FILE};
use drawsync_server::{RelayConfig, RelayListener, RelayResult, RelayStore};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TCP port to listen on
    port: u16,
    /// Snapshot file holding the merged document
    #[arg(long, default_value = DEFAULT_STORE_FILE)]
    store: PathBuf,
    /// Concurrent syncs before new connections are turned away
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_connections: usize,
    /// Deadline in seconds for each handshake step
    #[arg(long, default_value_t = drawsync_core::protocol::DEFAULT_SYNC_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            bind: args.bind,
            port: args.port,
            store_path: args.store,
            max_connections: args.max_connections,
            timeout: Duration::from_secs(args.timeout_secs),
            ..RelayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drawsync_server=info,drawsync_core=info".into()),
        )
        .init();

    match run(args.into()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RelayConfig) -> RelayResult<()> {
    let store = Arc::new(RelayStore::open_file(&config.store_path).await?);
    let listener = RelayListener::bind(&config, store).await?;
    info!(
        "DrawSync relay listening on {} (max {} connections, {}s timeout)",
        listener.local_addr()?,
        listener.max_connections(),
        config.timeout.as_secs()
    );

    listener
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

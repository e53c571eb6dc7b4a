//! murmurd, the Murmur daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_chain::HttpRpc;
use murmur_core::Address;
use murmur_daemon::{build_router, AppContext, DaemonConfig};
use murmur_ipc::IpcServer;
use murmur_settings::Settings;
use murmur_store::TipStore;
use murmur_tips::{
    run_reconciler, ConfessionService, MemoryRateLimiter, PermissiveClassifier, RatePolicy,
    TipConfig, TipPipeline,
};

#[derive(Parser)]
#[command(name = "murmurd")]
#[command(about = "Anonymous confessions with verified USDC tips")]
#[command(version)]
struct Cli {
    /// Settings file (default: platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the Unix socket path.
    #[arg(long)]
    socket: Option<String>,

    /// Override the database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Override the chain RPC endpoint.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut settings: Settings<DaemonConfig> =
        Settings::load_or_default("murmur", cli.config.as_deref())
            .context("loading settings")?;
    if let Some(socket) = cli.socket {
        settings.config.socket_path = socket;
    }
    if let Some(db) = cli.db {
        settings.config.db_path = db;
    }
    if let Some(rpc_url) = cli.rpc_url {
        settings.config.rpc_url = rpc_url;
    }
    let config = settings.config.clone();

    info!(
        rpc_url = %config.rpc_url,
        db = %config.db_path.display(),
        socket = %config.socket_path,
        "murmurd starting"
    );

    let store = Arc::new(TipStore::open(&config.db_path).context("opening store")?);
    let chain = Arc::new(
        HttpRpc::new(
            &config.rpc_url,
            Duration::from_secs(config.rpc_timeout_secs),
        )
        .context("building chain RPC client")?,
    );
    let limiter = Arc::new(MemoryRateLimiter::new());

    let tip_config = TipConfig {
        asset_address: Address::parse(&config.asset_address)
            .context("parsing asset address")?,
        rate_policy: RatePolicy {
            max_per_window: config.max_tips_per_day,
            window_ms: murmur_tips::config::DEFAULT_RATE_WINDOW_MS,
        },
        reconcile_interval_secs: config.reconcile_interval_secs,
        ..TipConfig::default()
    };

    let pipeline = Arc::new(TipPipeline::new(
        store.clone(),
        chain,
        limiter.clone(),
        tip_config,
    ));
    let confessions = Arc::new(ConfessionService::new(
        store.clone(),
        Arc::new(PermissiveClassifier),
        limiter,
    ));

    tokio::spawn(run_reconciler(
        store.clone(),
        config.reconcile_interval_secs,
    ));

    let ctx = AppContext {
        store,
        pipeline,
        confessions,
    };
    let router = build_router(&ctx);

    let server = IpcServer::new(&config.socket_path);
    server.run(Arc::new(router)).await.context("IPC server")?;
    Ok(())
}

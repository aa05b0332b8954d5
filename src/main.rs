use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stakeduel::config::Config;
use stakeduel::gaming::{MatchManager, RecoverySweeper};
use stakeduel::transport::{ws, ConnectionRegistry};
use stakeduel::{Error, InMemoryAudit, InMemoryIdentity, InMemoryWallet, Result};

#[derive(Parser, Debug)]
#[command(name = "stakeduel", about = "Real-time wager match server")]
struct Cli {
    /// Path to a TOML config file; falls back to environment-based
    /// lookup when omitted
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Listen address override
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_file(path)?;
            config.validate()?;
            config
        }
        None => Config::load()?,
    };

    let addr: SocketAddr = match cli.listen {
        Some(addr) => addr,
        None => format!(
            "{}:{}",
            config.server.listen_address, config.server.listen_port
        )
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))?,
    };

    let wallet = Arc::new(InMemoryWallet::new());
    let audit = Arc::new(InMemoryAudit::new());
    let identity = Arc::new(InMemoryIdentity::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let manager = MatchManager::new(
        wallet.clone(),
        audit.clone(),
        identity.clone(),
        registry.clone(),
        &config,
    );

    let mut sweeper = RecoverySweeper::new(manager.clone(), config.sweeper.clone(), &config.game);
    sweeper.start();

    info!(
        turn_timeout_secs = config.game.turn_timeout.as_secs(),
        fee_percent = %config.settlement.fee_percent,
        "stakeduel starting"
    );

    tokio::select! {
        result = ws::serve(manager, registry, addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            sweeper.stop();
            Ok(())
        }
    }
}

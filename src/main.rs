mod cache;
mod config;
mod gateway;
mod network;
mod server;
mod telemetry;

use clap::Parser;
use color_eyre::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use cache::{CacheStore, MemoryStore, SqliteStore};
use config::StoreBackend;
use gateway::{GatewaySettings, Registry};
use network::UpstreamClient;

#[derive(Parser, Debug)]
#[command(name = "pms-gateway")]
#[command(about = "Offline cache gateway for the hotel PMS web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./pms-gateway.yaml or $XDG_CONFIG_HOME/pms-gateway/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Upstream origin to forward to
  #[arg(short, long)]
  upstream: Option<String>,

  /// Address to listen on
  #[arg(short, long)]
  listen: Option<SocketAddr>,

  /// Cache version tag; changing it replaces both partitions
  #[arg(long)]
  version_tag: Option<String>,

  /// Keep the cache in memory instead of SQLite
  #[arg(long)]
  ephemeral: bool,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = telemetry::init(args.log_file.as_deref())?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(upstream) = args.upstream {
    config.network.upstream = upstream;
  }
  if let Some(listen) = args.listen {
    config.listen = listen;
  }
  if let Some(version) = args.version_tag {
    config.cache.version = version;
  }
  if args.ephemeral {
    config.cache.backend = StoreBackend::Memory;
  }
  config.validate()?;

  let store: Arc<dyn CacheStore> = match config.cache.backend {
    StoreBackend::Sqlite => match &config.cache.path {
      Some(path) => Arc::new(SqliteStore::open_at(path)?),
      None => Arc::new(SqliteStore::open()?),
    },
    StoreBackend::Memory => Arc::new(MemoryStore::new()),
  };
  let fetcher = Arc::new(UpstreamClient::new(&config.network)?);

  info!(
    upstream = %config.network.upstream,
    version = %config.cache.version,
    backend = ?config.cache.backend,
    "starting gateway"
  );

  // Install and activate the configured version before taking traffic
  let registry = Arc::new(Registry::new(store, fetcher));
  registry.register(GatewaySettings::from(&config)).await?;

  server::serve(server::ServerState {
    registry,
    config: Arc::new(RwLock::new(config)),
  })
  .await
}

//! waypoint-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the Waypoint JSON API over HTTP.
//! Every setting can also come from the environment with a `WAYPOINT_`
//! prefix (e.g. `WAYPOINT_PORT=8080`).

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use waypoint_core::store::TimelineStore as _;
use waypoint_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Waypoint timeline service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host: String,
  #[serde(default = "default_port")]
  port: u16,
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  /// Interval between physical sweeps of expired policy rows.
  /// Zero disables the sweep; expiry stays correct either way (lazy expiry
  /// filters expired rows from every read).
  #[serde(default = "default_sweep_secs")]
  policy_sweep_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("waypoint.db") }
fn default_sweep_secs() -> u64 { 3600 }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("WAYPOINT"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open SQLite store.
  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;
  let store = Arc::new(store);

  // Periodic sweep for lazily-expired policy rows.
  if server_cfg.policy_sweep_secs > 0 {
    let sweep_store = Arc::clone(&store);
    let period = Duration::from_secs(server_cfg.policy_sweep_secs);
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      // The first tick completes immediately; skip it.
      interval.tick().await;
      loop {
        interval.tick().await;
        if let Err(e) = sweep_store.purge_expired_policies().await {
          tracing::warn!(error = %e, "expired-policy sweep failed");
        }
      }
    });
  }

  let app = waypoint_api::api_router(store).layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

#[macro_use]
extern crate log;

use clap::Parser;
use log::LevelFilter;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use sweeper_server::config::{ServerConfig, DEFAULT_SERVER_TOML};
#[cfg(feature = "file-persistence")]
use sweeper_server::persistence::FileGateway;
use sweeper_server::persistence::{InMemoryGateway, PersistenceGateway};
use sweeper_server::GameServer;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
  /// Path to the primary TOML config file. Any key it doesn't set falls
  /// back to the embedded default.
  #[clap(long, default_value = "server.toml")]
  config: PathBuf,
  /// Overrides `log-level` from the config file when set.
  #[clap(long)]
  log_level: Option<LevelFilter>,
}

fn main() {
  let args = Args::parse();
  let config: ServerConfig = sweeper_common::config::load_layered(&args.config, "server-default.toml", DEFAULT_SERVER_TOML);

  let level = args.log_level.unwrap_or_else(|| config.log_level.parse().unwrap_or(LevelFilter::Info));
  sweeper_common::init_with_level("sweeper_server", level);

  let gateway: Arc<dyn PersistenceGateway> = build_gateway(&config);
  let server = GameServer::new(config.timer_tick_ms, gateway, None);

  info!("sweeper_server ready (no transport bound); awaiting shutdown signal");

  let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
  let handler_shutdown = shutdown.clone();
  if let Err(e) = ctrlc::set_handler(move || {
    let (lock, cvar) = &*handler_shutdown;
    *lock.lock() = true;
    cvar.notify_all();
  }) {
    error!("failed to install signal handler: {e}");
  }

  let (lock, cvar) = &*shutdown;
  let mut signalled = lock.lock();
  if !*signalled {
    cvar.wait(&mut signalled);
  }

  info!("shutdown signal received, persisting sessions");
  server.shutdown();
  info!("sweeper_server exiting");
}

#[cfg(feature = "file-persistence")]
fn build_gateway(config: &ServerConfig) -> Arc<dyn PersistenceGateway> { Arc::new(FileGateway::new(&config.data_dir)) }

#[cfg(not(feature = "file-persistence"))]
fn build_gateway(_config: &ServerConfig) -> Arc<dyn PersistenceGateway> { Arc::new(InMemoryGateway::new()) }

//! gramsevak-proxy entry point.
//!
//! Boots the interception cache in front of the configured origin: installs the
//! static manifest, activates (pruning stale stores) and then serves HTTP.
//! Logging goes to stderr as JSON.

use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use gramsevak_client::{CacheSettings, FetchClient, FetchConfig, InterceptCache, Network};
use gramsevak_core::{AppConfig, CacheDb, CacheStorage};

mod error;
mod handler;

const INSTALL_ATTEMPTS: u32 = 3;
const INSTALL_BACKOFF: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, listen = %config.listen_addr, "starting gramsevak-proxy");

    let storage = CacheDb::open(&config.db_path).await?;
    let network = FetchClient::new(FetchConfig::from(&config))?;
    let settings = CacheSettings::from_config(&config)?;
    let cache = InterceptCache::new(storage, network, settings);

    install_with_retry(&cache).await?;
    let report = cache.activate().await?;
    tracing::info!(deleted = ?report.deleted, "activated");

    let app = handler::router(cache, config.origin.clone(), config.max_bytes);
    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Install is all-or-nothing; the origin may still be starting, so retry a few times.
async fn install_with_retry<S: CacheStorage, N: Network>(cache: &InterceptCache<S, N>) -> Result<()> {
    let mut delay = INSTALL_BACKOFF;
    let mut attempt = 1;
    loop {
        match cache.install().await {
            Ok(report) => {
                tracing::info!(store = %report.store, cached = report.cached, "installed");
                return Ok(());
            }
            Err(e) if attempt < INSTALL_ATTEMPTS => {
                tracing::warn!(attempt, "install failed, retrying in {:?}: {}", delay, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}

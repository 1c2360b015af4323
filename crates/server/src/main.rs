//! swcache-proxy entry point.
//!
//! Sits between the page and its origin: loads configuration, installs and
//! activates the current cache version, then serves every request through
//! the cache manager until Ctrl-C. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use swcache_client::{CacheManager, FetchClient, FetchConfig, ManagerConfig};
use swcache_core::{AppConfig, CacheDb};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.cache_version, origin = %config.origin, "starting swcache-proxy");

    let db = open_store(&config).await?;
    let fetcher = FetchClient::new(FetchConfig::from_app_config(&config))?;
    let manager = Arc::new(CacheManager::new(db, Arc::new(fetcher), ManagerConfig::from_app_config(&config)?)?);

    let state = manager.start().await;
    tracing::info!(state = state.as_str(), "cache lifecycle settled");

    let sweeper = tokio::spawn(sweep_loop(Arc::clone(&manager), config.sweep_interval()));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    let app = handler::router(handler::ProxyState::new(Arc::clone(&manager), config.max_bytes));
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    let settled = manager.settle().await;
    tracing::info!(settled, "shut down");
    Ok(())
}

/// Open the configured store. An unusable cache file falls back to an
/// in-memory store so pages keep being served.
async fn open_store(config: &AppConfig) -> Result<CacheDb> {
    let db = match CacheDb::open(&config.db_path).await {
        Ok(db) => db,
        Err(e) => {
            tracing::warn!(
                path = %config.db_path.display(),
                error = %e,
                "cache file unavailable, falling back to an in-memory store"
            );
            CacheDb::open_in_memory().await.context("opening in-memory cache")?
        }
    };
    Ok(db.with_quota(config.quota_bytes))
}

async fn sweep_loop(manager: Arc<CacheManager>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        match manager.sweep().await {
            Ok(evicted) => tracing::debug!(evicted, "sweep finished"),
            Err(e) => tracing::warn!(error = %e, "sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}

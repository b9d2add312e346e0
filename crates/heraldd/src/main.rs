//! Herald Daemon - guild record store
//!
//! Owns the persistent record set and its background workers. The chat
//! surface and other consumers talk to it through the `Store` handle and
//! its event channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use heraldd::cache::VolatileCache;
use heraldd::config::Config;
use heraldd::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("heraldd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    let store = Store::open(&config)?;

    spawn_autosave_task(&store, config.flush.autosave_interval_secs);

    let cache: Arc<RwLock<VolatileCache<serde_json::Value>>> =
        Arc::new(RwLock::new(VolatileCache::new()));
    spawn_cache_sweep_task(&cache, config.cache.sweep_interval_secs);

    info!("heraldd ready");

    tokio::signal::ctrl_c().await?;

    // Final flush so nothing marked dirty is lost on the way out.
    store.flush_now().await;
    info!("Shutting down gracefully");

    Ok(())
}

/// Periodic flush so a quiet process still converges to disk
fn spawn_autosave_task(store: &Store, interval_secs: u64) {
    let store = store.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await; // first tick completes immediately

        loop {
            ticker.tick().await;
            store.schedule_flush();
        }
    });

    info!("autosave task started (interval: {}s)", interval_secs);
}

/// Periodic sweep of expired cache entries
fn spawn_cache_sweep_task(
    cache: &Arc<RwLock<VolatileCache<serde_json::Value>>>,
    interval_secs: u64,
) {
    let cache = Arc::clone(cache);
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = cache.write().await.sweep();
            if removed > 0 {
                debug!("cache sweep removed {} expired entries", removed);
            }
        }
    });

    info!("cache sweep task started (interval: {}s)", interval_secs);
}

//! Mini Cachelock demo
//!
//! Wires an expiring store, a coalescing read-through cache and a
//! lock-protected job against the in-process coordinator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cachelock::coordinator::InMemoryCoordinator;
use mini_cachelock::policy::{loader_fn, HashBloomFilter, ReadPolicy, ReadThroughCache};
use mini_cachelock::{Cache, Config, Error, ExpiringStore, LockClient};

const JOB_KEY: &str = "jobs:nightly-report";

/// Demo entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Serve a burst of concurrent reads through the coalescing cache
/// 4. Run a job under a distributed lock with auto-refresh
/// 5. Stop early on Ctrl+C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cachelock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: sweep_interval={}ms, default_ttl={}s, lock_ttl={}s, refresh_interval={}s",
        config.sweep_interval_ms, config.default_ttl, config.lock_ttl, config.refresh_interval
    );

    let store = Arc::new(ExpiringStore::<String>::new(config.store_options()));
    let coordinator = Arc::new(InMemoryCoordinator::new());

    serve_reads(&config, store.clone()).await?;

    tokio::select! {
        result = run_locked_job(&config, coordinator) => result?,
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, stopping early");
        }
    }

    let stats = store.stats().await;
    info!(
        "Store stats: hits={}, misses={}, expirations={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.expirations,
        stats.hit_rate()
    );
    store.close();
    Ok(())
}

/// Fires concurrent reads at a cold key; only one reaches the loader.
async fn serve_reads(config: &Config, store: Arc<ExpiringStore<String>>) -> anyhow::Result<()> {
    let bloom = Arc::new(HashBloomFilter::new(1_000, 0.01));
    for id in 1..=3 {
        bloom.insert(&format!("user:{id}"));
    }

    let loader = loader_fn(|key: String| async move {
        info!(key = %key, "Loading from slow source");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, Error>(format!("profile for {key}"))
    });
    let cache = Arc::new(
        ReadThroughCache::new(store, loader, config.default_ttl(), ReadPolicy::Coalesced)
            .with_bloom_filter(bloom),
    );

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("user:1").await })
        })
        .collect();
    for reader in readers {
        let value = reader.await.context("reader task panicked")??;
        info!(value = %value, "Read served");
    }

    match cache.get("user:404").await {
        Err(err) if err.is_miss() => info!("user:404 rejected without a load"),
        other => warn!(result = ?other, "Unexpected result for unknown key"),
    }
    Ok(())
}

/// Holds the job lock for the duration of a simulated job.
async fn run_locked_job(config: &Config, coordinator: Arc<InMemoryCoordinator>) -> anyhow::Result<()> {
    let client = LockClient::new(coordinator);
    let lock = client
        .try_lock(JOB_KEY, config.lock_ttl())
        .await
        .context("job is already running elsewhere")?;
    let mut refresher = lock.spawn_auto_refresh(config.refresh_options());

    let job = async {
        for step in 1..=3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            info!(step, "Job step finished");
        }
    };

    tokio::select! {
        _ = job => {}
        result = refresher.failed() => {
            // lease lost mid-job: abandon the critical section
            result.context("lease refresh failed")?;
        }
    }

    lock.unlock().await?;
    refresher.stop().await?;
    Ok(())
}

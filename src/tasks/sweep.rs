//! Expiry Sweep Task
//!
//! Background task that periodically removes expired store entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{StoreCore, StoreOptions};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a background task that periodically sweeps expired entries.
///
/// Each tick removes at most `options.max_evictions_per_sweep` entries while
/// holding the store's write lock; whatever is left is picked up by later
/// ticks or by lazy expiry on read. The task holds only a weak reference and
/// exits on its own once the store is dropped.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by the store on close.
pub(crate) fn spawn_sweep_task<V>(core: Weak<StoreCore<V>>, options: StoreOptions) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let period = options.sweep_interval.max(MIN_SWEEP_INTERVAL);
    let limit = options.max_evictions_per_sweep;

    tokio::spawn(async move {
        info!(
            interval_ms = period.as_millis() as u64,
            max_evictions = limit,
            "Starting expiry sweep task"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(core) = core.upgrade() else {
                debug!("Store dropped, sweep task exiting");
                break;
            };
            let removed = core.sweep_expired(limit).await;
            drop(core);

            if removed > 0 {
                info!(removed, "Expiry sweep removed entries");
            } else {
                debug!("Expiry sweep found no expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ExpiringStore;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let store = ExpiringStore::new(
            StoreOptions::default().with_sweep_interval(Duration::from_secs(1)),
        );
        store
            .set("expire_soon", "value", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(store.len().await, 0, "Expired entry should have been swept");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_preserves_valid_entries() {
        let store = ExpiringStore::new(
            StoreOptions::default().with_sweep_interval(Duration::from_secs(1)),
        );
        store
            .set("long_lived", "value", Duration::from_secs(3600))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(store.get("long_lived").await, Ok("value"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_is_bounded_per_tick() {
        let store = ExpiringStore::new(
            StoreOptions::default()
                .with_sweep_interval(Duration::from_secs(1))
                .with_max_evictions_per_sweep(2),
        );
        for i in 0..5 {
            store
                .set(&format!("k{i}"), i, Duration::from_millis(100))
                .await
                .unwrap();
        }

        // First tick at t=1s removes two, second at t=2s two more
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.len().await, 3);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_exits_without_store() {
        let handle = spawn_sweep_task::<u8>(
            Weak::new(),
            StoreOptions::default().with_sweep_interval(Duration::from_secs(1)),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished(), "Task should exit once the store is gone");
    }
}

//! Background purge of expired entries.
//!
//! Lazy expiry only frees an entry when its key is looked up again, so a
//! credential seen once stays in memory until something sweeps it. The
//! sweeper task periodically calls [`ShardStore::purge_expired`] and updates
//! the `token_cache_entries` gauge.
//!
//! The task holds only a `Weak` reference to the store and exits on its own
//! once the cache is dropped.

use crate::error::CacheError;
use crate::observability::set_cache_entries;
use crate::shard::ShardStore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Spawn a sweeper for `store` on the current tokio runtime.
///
/// The first sweep runs one `interval` after spawning.
///
/// # Errors
///
/// Returns `CacheError::Configuration` if no tokio runtime is running.
pub fn spawn_sweeper<V>(
    store: &Arc<ShardStore<V>>,
    interval: Duration,
) -> Result<JoinHandle<()>, CacheError>
where
    V: Send + Sync + 'static,
{
    let handle = Handle::try_current().map_err(|e| {
        CacheError::Configuration(format!("sweeper requires a tokio runtime: {e}"))
    })?;

    info!(
        target: "token_cache.sweeper",
        interval_secs = interval.as_secs(),
        "Starting token cache sweeper"
    );

    // Schedule starts at spawn time, not at the task's first poll.
    let first_sweep = Instant::now() + interval;
    Ok(handle.spawn(sweep_loop(Arc::downgrade(store), first_sweep, interval)))
}

async fn sweep_loop<V>(store: Weak<ShardStore<V>>, first_sweep: Instant, period: Duration) {
    let mut ticker = tokio::time::interval_at(first_sweep, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(store) = store.upgrade() else {
            debug!(target: "token_cache.sweeper", "Cache dropped, sweeper exiting");
            break;
        };

        let removed = store.purge_expired();
        let entries = store.len();
        set_cache_entries(entries);

        if removed > 0 {
            debug!(
                target: "token_cache.sweeper",
                removed = removed,
                entries = entries,
                "Purged expired entries"
            );
        }
    }
}

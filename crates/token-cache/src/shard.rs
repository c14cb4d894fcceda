//! Sharded TTL store for cached verification results.
//!
//! The key space is split across a fixed number of shards, each a `HashMap`
//! behind its own `RwLock`. [`ShardRouter`] picks the shard for a key and
//! [`ShardStore`] holds the maps. Operations on different shards never
//! contend, and no operation holds more than one shard lock at a time.
//!
//! Expiry is lazy: a lookup that finds an expired entry reports a miss and
//! removes the entry, taking the shard's write lock only in that case.
//! [`ShardStore::purge_expired`] exists for the optional background sweeper.
//!
//! Locks are never held across an `.await`, so `std::sync::RwLock` is used
//! rather than an async lock. A poisoned lock is recovered: entries are
//! replaced whole, so a panic elsewhere cannot leave one half-written.

use crate::key::CacheKey;
use crate::observability::{record_eviction, EvictionReason};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Maps cache keys to shard indexes.
///
/// Uses a randomly seeded SipHash (`RandomState`). Cache keys are already
/// uniformly distributed MAC output, so any decent hash spreads them evenly;
/// the routing only has to be stable for the lifetime of the router.
#[derive(Debug, Clone)]
pub struct ShardRouter {
    shard_count: NonZeroUsize,
    hasher: RandomState,
}

impl ShardRouter {
    #[must_use]
    pub fn new(shard_count: NonZeroUsize) -> Self {
        Self {
            shard_count,
            hasher: RandomState::new(),
        }
    }

    /// Shard index for `key`, always in `0..shard_count`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn route(&self, key: &CacheKey) -> usize {
        // Result is < shard_count, which came from a usize
        (self.hasher.hash_one(key) % self.shard_count.get() as u64) as usize
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shard_count.get()
    }
}

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

type ShardMap<V> = HashMap<CacheKey, Entry<V>>;

struct Shard<V> {
    entries: RwLock<ShardMap<V>>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ShardMap<V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap<V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed array of independently locked TTL maps.
///
/// Callers pick the shard with a [`ShardRouter`] built for the same shard
/// count:
///
/// ```
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use token_cache::shard::{ShardRouter, ShardStore};
/// use token_cache::KeyDeriver;
///
/// # fn main() -> Result<(), token_cache::CacheError> {
/// let shard_count = NonZeroUsize::new(4).unwrap();
/// let router = ShardRouter::new(shard_count);
/// let store = ShardStore::new(shard_count, None);
///
/// let key = KeyDeriver::generate()?.derive(&["api"], "token");
/// let shard = router.route(&key);
///
/// store.set(shard, key, Arc::new("alice"), Duration::from_secs(60));
/// assert_eq!(store.get(shard, &key).as_deref(), Some(&"alice"));
///
/// assert!(store.remove(shard, &key));
/// assert!(store.get(shard, &key).is_none());
/// # Ok(())
/// # }
/// ```
pub struct ShardStore<V> {
    shards: Box<[Shard<V>]>,
    max_entries_per_shard: Option<NonZeroUsize>,
    evictions: AtomicU64,
}

impl<V> std::fmt::Debug for ShardStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardStore")
            .field("shard_count", &self.shards.len())
            .field("max_entries_per_shard", &self.max_entries_per_shard)
            .field("evictions", &self.evictions.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<V> ShardStore<V> {
    /// Create a store with `shard_count` empty shards.
    ///
    /// With `max_entries_per_shard` unset, memory is bounded only by TTL.
    #[must_use]
    pub fn new(shard_count: NonZeroUsize, max_entries_per_shard: Option<NonZeroUsize>) -> Self {
        let shards = (0..shard_count.get()).map(|_| Shard::new()).collect();
        Self {
            shards,
            max_entries_per_shard,
            evictions: AtomicU64::new(0),
        }
    }

    fn shard(&self, shard_idx: usize) -> Option<&Shard<V>> {
        let shard = self.shards.get(shard_idx);
        if shard.is_none() {
            tracing::warn!(
                target: "token_cache.shard",
                shard_idx = shard_idx,
                shard_count = self.shards.len(),
                "Shard index out of range"
            );
        }
        shard
    }

    /// Look up a live entry.
    ///
    /// An expired entry is reported as absent and removed.
    #[must_use]
    pub fn get(&self, shard_idx: usize, key: &CacheKey) -> Option<Arc<V>> {
        let shard = self.shard(shard_idx)?;
        let now = Instant::now();

        {
            let entries = shard.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
            }
        }

        // Expired: upgrade to the write lock for this shard only. A writer may
        // have replaced the entry in between, so re-check before removing.
        let mut entries = shard.write();
        let still_expired = entries.get(key).is_some_and(|entry| entry.is_expired(now));
        if still_expired {
            entries.remove(key);
            drop(entries);
            self.note_evictions(EvictionReason::Expired, 1);
            tracing::trace!(
                target: "token_cache.shard",
                key = %key.correlation_id(),
                shard_idx = shard_idx,
                "Removed expired entry on lookup"
            );
        }
        None
    }

    /// Insert or replace an entry that expires `ttl` from now.
    ///
    /// A zero `ttl` means "do not cache" and leaves the shard untouched.
    pub fn set(&self, shard_idx: usize, key: CacheKey, value: Arc<V>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let Some(shard) = self.shard(shard_idx) else {
            return;
        };
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl) else {
            tracing::warn!(
                target: "token_cache.shard",
                ttl_secs = ttl.as_secs(),
                "TTL overflows the clock, not caching"
            );
            return;
        };

        let mut entries = shard.write();
        let mut capacity_evictions = 0;
        if let Some(max) = self.max_entries_per_shard {
            if !entries.contains_key(&key) && entries.len() >= max.get() {
                capacity_evictions = make_room(&mut entries, now, max.get());
            }
        }
        entries.insert(key, Entry { value, expires_at });
        drop(entries);

        if capacity_evictions > 0 {
            self.note_evictions(EvictionReason::Capacity, capacity_evictions);
            tracing::warn!(
                target: "token_cache.shard",
                shard_idx = shard_idx,
                evicted = capacity_evictions,
                "Shard at capacity, evicted earliest-expiring entry"
            );
        }
    }

    /// Remove an entry regardless of expiry. Returns whether one was present.
    pub fn remove(&self, shard_idx: usize, key: &CacheKey) -> bool {
        let Some(shard) = self.shard(shard_idx) else {
            return false;
        };
        let removed = shard.write().remove(key).is_some();
        if removed {
            self.note_evictions(EvictionReason::Invalidated, 1);
        }
        removed
    }

    /// Drop every expired entry, one shard at a time.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut entries = shard.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            removed += before - entries.len();
        }
        self.note_evictions(EvictionReason::Expired, removed as u64);
        removed
    }

    /// Number of stored entries, including expired ones not yet removed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Entries stored in one shard; 0 for an out-of-range index.
    #[must_use]
    pub fn shard_len(&self, shard_idx: usize) -> usize {
        self.shards
            .get(shard_idx)
            .map_or(0, |shard| shard.read().len())
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total entries removed so far for any reason.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn note_evictions(&self, reason: EvictionReason, count: u64) {
        if count == 0 {
            return;
        }
        self.evictions.fetch_add(count, Ordering::Relaxed);
        record_eviction(reason, count);
    }
}

/// Free at least one slot in a full shard. Expired entries go first; if none
/// were expired, the entry closest to expiry is dropped.
fn make_room<V>(entries: &mut ShardMap<V>, now: Instant, max: usize) -> u64 {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let mut evicted = (before - entries.len()) as u64;

    while entries.len() >= max {
        let earliest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| *key);
        match earliest {
            Some(key) => {
                entries.remove(&key);
                evicted += 1;
            }
            None => break,
        }
    }
    evicted
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::key::KeyDeriver;
    use std::sync::mpsc;
    use std::thread;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn keys(n: usize) -> Vec<CacheKey> {
        let deriver = KeyDeriver::generate().unwrap();
        (0..n)
            .map(|i| deriver.derive(&["api"], &format!("token-{i}")))
            .collect()
    }

    // -------------------------------------------------------------------------
    // ShardRouter
    // -------------------------------------------------------------------------

    #[test]
    fn test_route_is_deterministic_and_in_range() {
        let router = ShardRouter::new(nz(DEFAULT_SHARD_COUNT));
        for key in keys(200) {
            let idx = router.route(&key);
            assert!(idx < DEFAULT_SHARD_COUNT);
            assert_eq!(idx, router.route(&key));
        }
    }

    #[test]
    fn test_single_shard_routes_everything_to_zero() {
        let router = ShardRouter::new(nz(1));
        assert!(keys(20).iter().all(|key| router.route(key) == 0));
    }

    #[test]
    fn test_route_distribution_is_roughly_balanced() {
        let router = ShardRouter::new(nz(8));
        let mut counts = [0usize; 8];
        for key in keys(8000) {
            *counts.get_mut(router.route(&key)).unwrap() += 1;
        }
        // Expected 1000 per shard; a uniform hash stays well inside this band
        for count in counts {
            assert!((700..=1300).contains(&count), "unbalanced shard: {counts:?}");
        }
    }

    // -------------------------------------------------------------------------
    // ShardStore basics
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let store = ShardStore::new(nz(4), None);
        let key = keys(1)[0];

        store.set(2, key, Arc::new("alice"), Duration::from_secs(60));

        assert_eq!(store.get(2, &key).as_deref(), Some(&"alice"));
        assert_eq!(store.shard_len(2), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_noop() {
        let store = ShardStore::new(nz(4), None);
        let key = keys(1)[0];

        store.set(0, key, Arc::new(1), Duration::ZERO);

        assert!(store.get(0, &key).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_existing_record() {
        let store = ShardStore::new(nz(1), None);
        let key = keys(1)[0];

        store.set(0, key, Arc::new("first"), Duration::from_secs(60));
        store.set(0, key, Arc::new("second"), Duration::from_secs(60));

        assert_eq!(store.get(0, &key).as_deref(), Some(&"second"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_and_is_removed_on_lookup() {
        let store = ShardStore::new(nz(1), None);
        let key = keys(1)[0];
        store.set(0, key, Arc::new(7), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get(0, &key).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(0, &key).is_none(), "expired at exactly ttl");
        assert_eq!(store.len(), 0, "expired entry removed lazily");
        assert_eq!(store.evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let store = ShardStore::new(nz(2), None);
        let key = keys(1)[0];
        store.set(1, key, Arc::new(()), Duration::from_secs(60));

        assert!(store.remove(1, &key));
        assert!(!store.remove(1, &key));
        assert!(store.get(1, &key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_shard_is_a_miss() {
        let store = ShardStore::new(nz(2), None);
        let key = keys(1)[0];

        store.set(5, key, Arc::new(()), Duration::from_secs(60));

        assert!(store.get(5, &key).is_none());
        assert!(!store.remove(5, &key));
        assert_eq!(store.shard_len(5), 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = ShardStore::new(nz(4), None);
        let ks = keys(6);
        for (i, key) in ks.iter().enumerate() {
            let ttl = if i % 2 == 0 { 5 } else { 50 };
            store.set(i % 4, *key, Arc::new(i), Duration::from_secs(ttl));
        }

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.purge_expired(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.purge_expired(), 0);
    }

    // -------------------------------------------------------------------------
    // Capacity bound
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_earliest_expiring() {
        let store = ShardStore::new(nz(1), Some(nz(2)));
        let ks = keys(3);

        store.set(0, ks[0], Arc::new(0), Duration::from_secs(30));
        store.set(0, ks[1], Arc::new(1), Duration::from_secs(10));
        store.set(0, ks[2], Arc::new(2), Duration::from_secs(20));

        assert_eq!(store.len(), 2);
        assert!(store.get(0, &ks[1]).is_none(), "earliest expiry evicted");
        assert!(store.get(0, &ks[0]).is_some());
        assert!(store.get(0, &ks[2]).is_some());
        assert_eq!(store.evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_prefers_expired_entries() {
        let store = ShardStore::new(nz(1), Some(nz(2)));
        let ks = keys(3);

        store.set(0, ks[0], Arc::new(0), Duration::from_secs(1));
        store.set(0, ks[1], Arc::new(1), Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(2)).await;
        store.set(0, ks[2], Arc::new(2), Duration::from_secs(50));

        assert!(store.get(0, &ks[1]).is_some(), "live entry kept");
        assert!(store.get(0, &ks[2]).is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_key_in_full_shard_does_not_evict() {
        let store = ShardStore::new(nz(1), Some(nz(2)));
        let ks = keys(2);

        store.set(0, ks[0], Arc::new(0), Duration::from_secs(10));
        store.set(0, ks[1], Arc::new(1), Duration::from_secs(20));
        store.set(0, ks[0], Arc::new(9), Duration::from_secs(10));

        assert_eq!(store.get(0, &ks[0]).as_deref(), Some(&9));
        assert!(store.get(0, &ks[1]).is_some());
        assert_eq!(store.evictions(), 0);
    }

    // -------------------------------------------------------------------------
    // Shard independence
    // -------------------------------------------------------------------------

    #[test]
    fn test_held_shard_lock_does_not_block_other_shards() {
        let store = Arc::new(ShardStore::new(nz(2), None));
        let ks = keys(2);
        let (k0, k1) = (ks[0], ks[1]);

        let guard = store.shards[0].write();

        let (tx, rx) = mpsc::channel();
        let worker_store = Arc::clone(&store);
        let worker = thread::spawn(move || {
            worker_store.set(1, k1, Arc::new("other"), Duration::from_secs(60));
            let hit = worker_store.get(1, &k1).is_some();
            tx.send(hit).unwrap();
        });

        let hit = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("shard 1 must not wait on shard 0's lock");
        assert!(hit);

        // Shard 0 itself is still blocked while the guard is held
        let (tx0, rx0) = mpsc::channel();
        let blocked_store = Arc::clone(&store);
        let blocked = thread::spawn(move || {
            blocked_store.set(0, k0, Arc::new("same"), Duration::from_secs(60));
            tx0.send(()).unwrap();
        });
        assert!(rx0.recv_timeout(std::time::Duration::from_millis(100)).is_err());

        drop(guard);
        rx0.recv_timeout(std::time::Duration::from_secs(5))
            .expect("shard 0 proceeds once released");

        worker.join().unwrap();
        blocked.join().unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_poisoned_shard_recovers() {
        let store = Arc::new(ShardStore::new(nz(1), None));
        let key = keys(1)[0];

        let poisoner = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _guard = poisoner.shards[0].write();
            panic!("poison the shard lock");
        })
        .join();

        store.set(0, key, Arc::new(1), Duration::from_secs(60));
        assert!(store.get(0, &key).is_some());
    }
}

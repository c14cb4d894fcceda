//! Cached token authentication.
//!
//! [`CachedTokenAuthenticator`] wraps any [`TokenAuthenticator`] and
//! remembers its verdicts for a bounded time:
//!
//! 1. Derive the cache key from `(audiences, token)` ([`KeyDeriver`])
//! 2. Pick the shard ([`ShardRouter`])
//! 3. On a live hit, return the stored result without calling the verifier
//! 4. On a miss, call the verifier once (outside any lock) and store the
//!    result with an outcome-dependent TTL
//!
//! | verifier result      | stored for                                   |
//! |----------------------|----------------------------------------------|
//! | `Ok(Authenticated)`  | `success_ttl`                                |
//! | `Ok(Rejected)`       | `failure_ttl`                                |
//! | `Err(_)`             | `failure_ttl` if `cache_errors`, else never  |
//!
//! A zero TTL disables caching for that outcome.
//!
//! # Staleness
//!
//! A credential revoked upstream can still be accepted from the cache for up
//! to `success_ttl`. Callers that learn of a revocation can call
//! [`CachedTokenAuthenticator::invalidate`].
//!
//! # Concurrency
//!
//! Concurrent misses for the same credential each call the verifier; the
//! last one to finish wins the cache slot. There is no in-flight
//! deduplication. Dropping an `authenticate` future cancels the verifier call
//! and caches nothing.

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::key::KeyDeriver;
use crate::observability::{
    record_lookup, record_store, record_verifier_call, LookupResult, TtlClass, VerifierInFlightGuard,
    VerifierOutcome,
};
use crate::shard::{ShardRouter, ShardStore};
use crate::sweeper;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Verdict of a successful verifier call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<R> {
    /// Token accepted; carries the verifier's response (user info, claims, ...).
    Authenticated(R),
    /// Token rejected. Not an error: the verifier worked and said no.
    Rejected,
}

impl<R> Verdict<R> {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Verdict::Authenticated(_))
    }

    #[must_use]
    pub fn response(&self) -> Option<&R> {
        match self {
            Verdict::Authenticated(response) => Some(response),
            Verdict::Rejected => None,
        }
    }

    #[must_use]
    pub fn into_response(self) -> Option<R> {
        match self {
            Verdict::Authenticated(response) => Some(response),
            Verdict::Rejected => None,
        }
    }
}

/// Result of authenticating one token.
pub type AuthResult<R, E> = Result<Verdict<R>, E>;

/// A cached record is exactly what the verifier returned.
pub type CacheRecord<R, E> = AuthResult<R, E>;

/// Something that can verify bearer tokens for a set of audiences.
///
/// Implementations may perform network I/O and are called concurrently.
/// Responses and errors are cloned out of the cache on every hit, so wrap
/// large values in an `Arc`.
#[async_trait]
pub trait TokenAuthenticator: Send + Sync {
    /// Data returned for an accepted token.
    type Response: Clone + Send + Sync + 'static;

    /// Error returned when verification itself fails.
    type Error: Clone + Send + Sync + 'static;

    /// Verify `token` for the ordered list of `audiences`.
    async fn authenticate(
        &self,
        audiences: &[String],
        token: &str,
    ) -> AuthResult<Self::Response, Self::Error>;
}

#[async_trait]
impl<T> TokenAuthenticator for Arc<T>
where
    T: TokenAuthenticator + ?Sized,
{
    type Response = T::Response;
    type Error = T::Error;

    async fn authenticate(
        &self,
        audiences: &[String],
        token: &str,
    ) -> AuthResult<Self::Response, Self::Error> {
        (**self).authenticate(audiences, token).await
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the verifier.
    pub misses: u64,
    /// Entries removed (expired, capacity or invalidated).
    pub evictions: u64,
    /// Entries currently stored, including expired ones not yet removed.
    pub entries: usize,
}

/// Caching wrapper around a [`TokenAuthenticator`].
pub struct CachedTokenAuthenticator<A: TokenAuthenticator> {
    inner: A,
    config: CacheConfig,
    deriver: KeyDeriver,
    router: ShardRouter,
    store: Arc<ShardStore<CacheRecord<A::Response, A::Error>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<A: TokenAuthenticator> std::fmt::Debug for CachedTokenAuthenticator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTokenAuthenticator")
            .field("config", &self.config)
            .field("deriver", &self.deriver)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<A: TokenAuthenticator> CachedTokenAuthenticator<A> {
    /// Wrap `inner` with a cache using a freshly generated MAC key.
    ///
    /// # Errors
    ///
    /// - `CacheError::Configuration` - `config` fails validation
    /// - `CacheError::KeyGeneration` - the system CSPRNG failed
    pub fn new(inner: A, config: CacheConfig) -> Result<Self, CacheError> {
        Self::with_key_deriver(inner, config, KeyDeriver::generate()?)
    }

    /// Wrap `inner` with a cache using an explicit key deriver.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if `config` fails validation.
    pub fn with_key_deriver(
        inner: A,
        config: CacheConfig,
        deriver: KeyDeriver,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let shard_count = config.shard_count_nonzero()?;
        let max_entries = config.max_entries_nonzero()?;

        info!(
            target: "token_cache.authenticator",
            success_ttl_secs = config.success_ttl.as_secs(),
            failure_ttl_secs = config.failure_ttl.as_secs(),
            cache_errors = config.cache_errors,
            shard_count = shard_count.get(),
            max_entries_per_shard = ?config.max_entries_per_shard,
            "Token cache initialized"
        );

        Ok(Self {
            inner,
            router: ShardRouter::new(shard_count),
            store: Arc::new(ShardStore::new(shard_count, max_entries)),
            deriver,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Authenticate `token` for `audiences`, consulting the cache first.
    ///
    /// Returns exactly what the wrapped verifier returned for this
    /// credential, either now or within the TTL window.
    #[instrument(skip_all, fields(audience_count = audiences.len()))]
    pub async fn authenticate(
        &self,
        audiences: &[String],
        token: &str,
    ) -> AuthResult<A::Response, A::Error> {
        let key = self.deriver.derive(audiences, token);
        let shard_idx = self.router.route(&key);

        if let Some(record) = self.store.get(shard_idx, &key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            record_lookup(LookupResult::Hit);
            debug!(
                target: "token_cache.authenticator",
                key = %key.correlation_id(),
                shard_idx = shard_idx,
                "Token cache hit"
            );
            return (*record).clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        record_lookup(LookupResult::Miss);

        let started = Instant::now();
        let result = {
            let _in_flight = VerifierInFlightGuard::start();
            self.inner.authenticate(audiences, token).await
        };
        let outcome = VerifierOutcome::of(&result);
        record_verifier_call(outcome, started.elapsed());

        match self.ttl_for(&result) {
            Some((ttl, ttl_class)) => {
                self.store
                    .set(shard_idx, key, Arc::new(result.clone()), ttl);
                record_store(ttl_class);
                debug!(
                    target: "token_cache.authenticator",
                    key = %key.correlation_id(),
                    shard_idx = shard_idx,
                    outcome = outcome.as_str(),
                    ttl_secs = ttl.as_secs(),
                    "Token cache miss, result stored"
                );
            }
            None => {
                debug!(
                    target: "token_cache.authenticator",
                    key = %key.correlation_id(),
                    outcome = outcome.as_str(),
                    "Token cache miss, result not cacheable"
                );
            }
        }

        result
    }

    /// TTL a verifier result should be stored with, or `None` if it must not
    /// be cached.
    fn ttl_for(&self, result: &AuthResult<A::Response, A::Error>) -> Option<(Duration, TtlClass)> {
        let (ttl, class) = match result {
            Err(_) if !self.config.cache_errors => return None,
            Ok(Verdict::Authenticated(_)) => (self.config.success_ttl, TtlClass::Success),
            Ok(Verdict::Rejected) | Err(_) => (self.config.failure_ttl, TtlClass::Failure),
        };
        (!ttl.is_zero()).then_some((ttl, class))
    }

    /// Drop the cached result for one credential so the next call re-verifies.
    ///
    /// Returns whether an entry was present.
    pub fn invalidate<S: AsRef<str>>(&self, audiences: &[S], token: &str) -> bool {
        let key = self.deriver.derive(audiences, token);
        let removed = self.store.remove(self.router.route(&key), &key);
        debug!(
            target: "token_cache.authenticator",
            key = %key.correlation_id(),
            removed = removed,
            "Token cache entry invalidated"
        );
        removed
    }

    /// Remove all expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Start the background sweeper if `sweep_interval` is configured.
    ///
    /// The task stops by itself once this cache is dropped; abort the handle
    /// to stop it earlier.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if called outside a tokio runtime.
    pub fn spawn_sweeper(&self) -> Result<Option<JoinHandle<()>>, CacheError> {
        self.config
            .sweep_interval
            .map(|interval| sweeper::spawn_sweeper(&self.store, interval))
            .transpose()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.store.evictions(),
            entries: self.store.len(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The wrapped verifier.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: TokenAuthenticator> TokenAuthenticator for CachedTokenAuthenticator<A> {
    type Response = A::Response;
    type Error = A::Error;

    async fn authenticate(
        &self,
        audiences: &[String],
        token: &str,
    ) -> AuthResult<Self::Response, Self::Error> {
        CachedTokenAuthenticator::authenticate(self, audiences, token).await
    }
}

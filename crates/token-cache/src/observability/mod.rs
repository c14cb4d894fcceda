//! Observability for the token cache.
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field
//! allow-listing. Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (outcome labels, shard index, durations)
//! - **DERIVED**: Cache-key correlation prefix (first 4 bytes of the HMAC, hex)
//! - **NEVER**: Must never appear in logs (tokens, audiences, MAC key material)
//!
//! Metric labels below are closed enums so label cardinality stays fixed no
//! matter how many distinct credentials pass through the cache.

pub mod metrics;

pub use metrics::{
    record_eviction, record_lookup, record_store, record_verifier_call, set_cache_entries,
    VerifierInFlightGuard,
};

use crate::authenticator::Verdict;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    /// Record found and not expired.
    Hit,
    /// No usable record; the verifier is consulted.
    Miss,
}

impl LookupResult {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupResult::Hit => "hit",
            LookupResult::Miss => "miss",
        }
    }
}

/// Outcome of one call to the underlying verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierOutcome {
    /// Token accepted.
    Authenticated,
    /// Token rejected without an error.
    Rejected,
    /// Verifier returned an error.
    Error,
}

impl VerifierOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifierOutcome::Authenticated => "authenticated",
            VerifierOutcome::Rejected => "rejected",
            VerifierOutcome::Error => "error",
        }
    }

    /// Classify a verifier result.
    #[must_use]
    pub fn of<R, E>(result: &Result<Verdict<R>, E>) -> Self {
        match result {
            Ok(Verdict::Authenticated(_)) => VerifierOutcome::Authenticated,
            Ok(Verdict::Rejected) => VerifierOutcome::Rejected,
            Err(_) => VerifierOutcome::Error,
        }
    }
}

/// Which TTL a stored record was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Success,
    Failure,
}

impl TtlClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TtlClass::Success => "success",
            TtlClass::Failure => "failure",
        }
    }
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// TTL elapsed (lazy removal on lookup or sweeper purge).
    Expired,
    /// Shard was full and this entry had the earliest expiry.
    Capacity,
    /// Explicit invalidation by the caller.
    Invalidated,
}

impl EvictionReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Invalidated => "invalidated",
        }
    }
}

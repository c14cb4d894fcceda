//! Metrics definitions for the token cache
//!
//! All metrics follow Prometheus naming conventions:
//! - `token_cache_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `result`: 2 values (hit, miss)
//! - `outcome`: 3 values (authenticated, rejected, error)
//! - `ttl_class`: 2 values (success, failure)
//! - `reason`: 3 values (expired, capacity, invalidated)
//!
//! The library only emits through the `metrics` facade. Installing a recorder
//! (Prometheus exporter or otherwise) is the embedding service's job.

use super::{EvictionReason, LookupResult, TtlClass, VerifierOutcome};
use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Request Metrics
// ============================================================================

/// Record a cache lookup
///
/// Metric: `token_cache_requests_total`
/// Labels: `result`
pub fn record_lookup(result: LookupResult) {
    counter!("token_cache_requests_total", "result" => result.as_str()).increment(1);
}

/// Record a completed call to the underlying verifier
///
/// Metric: `token_cache_verifier_calls_total`, `token_cache_verifier_duration_seconds`
/// Labels: `outcome`
pub fn record_verifier_call(outcome: VerifierOutcome, duration: Duration) {
    histogram!("token_cache_verifier_duration_seconds", "outcome" => outcome.as_str())
        .record(duration.as_secs_f64());

    counter!("token_cache_verifier_calls_total", "outcome" => outcome.as_str()).increment(1);
}

// ============================================================================
// Storage Metrics
// ============================================================================

/// Record a record being stored
///
/// Metric: `token_cache_stores_total`
/// Labels: `ttl_class`
pub fn record_store(ttl_class: TtlClass) {
    counter!("token_cache_stores_total", "ttl_class" => ttl_class.as_str()).increment(1);
}

/// Record entries leaving the cache
///
/// Metric: `token_cache_evictions_total`
/// Labels: `reason`
pub fn record_eviction(reason: EvictionReason, count: u64) {
    if count == 0 {
        return;
    }
    counter!("token_cache_evictions_total", "reason" => reason.as_str()).increment(count);
}

/// Update the cached-entries gauge
///
/// Metric: `token_cache_entries`
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_entries(count: usize) {
    gauge!("token_cache_entries").set(count as f64);
}

// ============================================================================
// In-flight Verifier Calls
// ============================================================================

/// Tracks one in-flight verifier call on the `token_cache_verifier_in_flight`
/// gauge.
///
/// The gauge is decremented on drop, so a cancelled `authenticate` future
/// still releases its slot.
#[must_use]
pub struct VerifierInFlightGuard(());

impl VerifierInFlightGuard {
    pub fn start() -> Self {
        gauge!("token_cache_verifier_in_flight").increment(1.0);
        Self(())
    }
}

impl Drop for VerifierInFlightGuard {
    fn drop(&mut self) {
        gauge!("token_cache_verifier_in_flight").decrement(1.0);
    }
}

//! Authentication result cache for bearer-token verifiers.
//!
//! [`CachedTokenAuthenticator`] sits in front of any [`TokenAuthenticator`]
//! (an identity provider, token-review API, introspection endpoint, ...) and
//! answers repeated `(audiences, token)` requests from memory:
//!
//! - Accepted and rejected verdicts are cached under separate TTLs
//! - Verifier errors are passed through and only cached when opted in
//! - Tokens are never stored; entries are keyed by an HMAC under a
//!   per-process random key
//! - Entries live in independently locked shards
//!
//! ```rust,ignore
//! let cache = CachedTokenAuthenticator::new(verifier, CacheConfig::from_env()?)?;
//! let _sweeper = cache.spawn_sweeper()?;
//!
//! match cache.authenticate(&audiences, &token).await {
//!     Ok(Verdict::Authenticated(user)) => { /* ... */ }
//!     Ok(Verdict::Rejected) => { /* 401 */ }
//!     Err(e) => { /* verifier unavailable */ }
//! }
//! ```

#![warn(clippy::pedantic)]

/// Cached authenticator and the verifier trait it wraps
pub mod authenticator;

/// Cache configuration (builder and environment loading)
pub mod config;

/// Error types
pub mod error;

/// HMAC cache-key derivation
pub mod key;

/// Metrics and log field conventions
pub mod observability;

/// Secret types that prevent accidental logging
pub mod secret;

/// Sharded TTL store
pub mod shard;

/// Background purge of expired entries
pub mod sweeper;

pub use authenticator::{
    AuthResult, CacheRecord, CacheStats, CachedTokenAuthenticator, TokenAuthenticator, Verdict,
};
pub use config::CacheConfig;
pub use error::CacheError;
pub use key::{CacheKey, KeyDeriver};
pub use secret::{ExposeSecret, MacKeyMaterial, SecretBox, MAC_KEY_LEN};

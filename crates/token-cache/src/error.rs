//! Error types for the token cache.
//!
//! Only construction can fail. Once a cache is built, lookups, stores and
//! key derivation are infallible; verifier errors pass through untouched and
//! are never wrapped in [`CacheError`].

use thiserror::Error;

/// Errors raised while building a cache or its configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Configuration values are out of range or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An environment variable was present but could not be parsed.
    #[error("Invalid environment variable {name}: {reason}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The system CSPRNG failed to produce MAC key material.
    #[error("Failed to generate MAC key material")]
    KeyGeneration,

    /// Caller-supplied MAC key material is too short.
    #[error("MAC key material too short: {len} bytes")]
    KeyMaterialTooShort {
        /// Length of the rejected material in bytes.
        len: usize,
    },
}

/// Result type alias using `CacheError`
pub type Result<T> = std::result::Result<T, CacheError>;

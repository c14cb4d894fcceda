//! Cache configuration.
//!
//! [`CacheConfig`] can be built in code with the `with_*` builder methods or
//! loaded from `TOKEN_CACHE_*` environment variables. Either way it is
//! validated when the cache is constructed.

use crate::error::CacheError;
use crate::shard::DEFAULT_SHARD_COUNT;
use std::collections::HashMap;
use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Default TTL for successful verifications (2 minutes).
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(120);

/// Default TTL for rejected tokens (10 seconds).
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(10);

/// Maximum allowed TTL for either outcome, and for the sweep interval (24 hours).
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum number of shards.
pub const MAX_SHARD_COUNT: usize = 4096;

pub const ENV_SUCCESS_TTL_SECONDS: &str = "TOKEN_CACHE_SUCCESS_TTL_SECONDS";
pub const ENV_FAILURE_TTL_SECONDS: &str = "TOKEN_CACHE_FAILURE_TTL_SECONDS";
pub const ENV_CACHE_ERRORS: &str = "TOKEN_CACHE_CACHE_ERRORS";
pub const ENV_SHARD_COUNT: &str = "TOKEN_CACHE_SHARD_COUNT";
pub const ENV_MAX_ENTRIES_PER_SHARD: &str = "TOKEN_CACHE_MAX_ENTRIES_PER_SHARD";
pub const ENV_SWEEP_INTERVAL_SECONDS: &str = "TOKEN_CACHE_SWEEP_INTERVAL_SECONDS";

/// Configuration for a [`CachedTokenAuthenticator`](crate::CachedTokenAuthenticator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether verifier errors may be cached (under `failure_ttl`).
    pub cache_errors: bool,

    /// TTL for accepted tokens. Zero disables caching of successes.
    pub success_ttl: Duration,

    /// TTL for rejected tokens. Zero disables caching of failures.
    pub failure_ttl: Duration,

    /// Number of independently locked shards.
    pub shard_count: usize,

    /// Optional per-shard entry limit. `None` bounds memory by TTL only.
    pub max_entries_per_shard: Option<usize>,

    /// Period of the background sweeper. `None` disables it.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_errors: false,
            success_ttl: DEFAULT_SUCCESS_TTL,
            failure_ttl: DEFAULT_FAILURE_TTL,
            shard_count: DEFAULT_SHARD_COUNT,
            max_entries_per_shard: None,
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    /// Default configuration with the given TTLs.
    #[must_use]
    pub fn new(success_ttl: Duration, failure_ttl: Duration) -> Self {
        Self {
            success_ttl,
            failure_ttl,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cache_errors(mut self, cache_errors: bool) -> Self {
        self.cache_errors = cache_errors;
        self
    }

    #[must_use]
    pub fn with_success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    #[must_use]
    pub fn with_max_entries_per_shard(mut self, max: usize) -> Self {
        self.max_entries_per_shard = Some(max);
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// See [`CacheConfig::from_vars`].
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing)
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidEnvVar` - a variable is set but unparsable
    /// - `CacheError::Configuration` - the resulting values fail [`CacheConfig::validate`]
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, CacheError> {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(vars, ENV_SUCCESS_TTL_SECONDS)? {
            config.success_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(vars, ENV_FAILURE_TTL_SECONDS)? {
            config.failure_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = vars.get(ENV_CACHE_ERRORS) {
            config.cache_errors = parse_bool(ENV_CACHE_ERRORS, raw)?;
        }
        if let Some(count) = parse_var::<usize>(vars, ENV_SHARD_COUNT)? {
            config.shard_count = count;
        }
        config.max_entries_per_shard = parse_var::<usize>(vars, ENV_MAX_ENTRIES_PER_SHARD)?;
        config.sweep_interval =
            parse_var::<u64>(vars, ENV_SWEEP_INTERVAL_SECONDS)?.map(Duration::from_secs);

        config.validate()?;
        Ok(config)
    }

    /// Check that all values are in range.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<(), CacheError> {
        self.shard_count_nonzero()?;
        if self.shard_count > MAX_SHARD_COUNT {
            return Err(CacheError::Configuration(format!(
                "shard_count must be at most {MAX_SHARD_COUNT}, got {}",
                self.shard_count
            )));
        }
        if self.success_ttl > MAX_TTL {
            return Err(CacheError::Configuration(format!(
                "success_ttl must be at most {}s, got {}s",
                MAX_TTL.as_secs(),
                self.success_ttl.as_secs()
            )));
        }
        if self.failure_ttl > MAX_TTL {
            return Err(CacheError::Configuration(format!(
                "failure_ttl must be at most {}s, got {}s",
                MAX_TTL.as_secs(),
                self.failure_ttl.as_secs()
            )));
        }
        self.max_entries_nonzero()?;
        if let Some(interval) = self.sweep_interval {
            if interval.is_zero() {
                return Err(CacheError::Configuration(
                    "sweep_interval must be greater than zero".into(),
                ));
            }
            if interval > MAX_TTL {
                return Err(CacheError::Configuration(format!(
                    "sweep_interval must be at most {}s, got {}s",
                    MAX_TTL.as_secs(),
                    interval.as_secs()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn shard_count_nonzero(&self) -> Result<NonZeroUsize, CacheError> {
        NonZeroUsize::new(self.shard_count)
            .ok_or_else(|| CacheError::Configuration("shard_count must be at least 1".into()))
    }

    pub(crate) fn max_entries_nonzero(&self) -> Result<Option<NonZeroUsize>, CacheError> {
        self.max_entries_per_shard
            .map(|max| {
                NonZeroUsize::new(max).ok_or_else(|| {
                    CacheError::Configuration("max_entries_per_shard must be at least 1".into())
                })
            })
            .transpose()
    }
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    vars.get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| CacheError::InvalidEnvVar {
                name: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, CacheError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(CacheError::InvalidEnvVar {
            name: name.to_string(),
            reason: format!("expected true or false, got {other:?}"),
        }),
    }
}

//! Fixed tokens, audiences and configs for deterministic tests

use std::time::Duration;
use token_cache::CacheConfig;

// Tokens
pub const TEST_GOOD_TOKEN: &str = "good-token";
pub const TEST_OTHER_GOOD_TOKEN: &str = "other-good-token";
pub const TEST_BAD_TOKEN: &str = "bad-token";
pub const TEST_FLAKY_TOKEN: &str = "flaky-token";

// Audiences
pub const TEST_AUDIENCE_API: &str = "api";
pub const TEST_AUDIENCE_ADMIN: &str = "admin";

/// Success TTL used by [`scenario_config`].
pub const SCENARIO_SUCCESS_TTL: Duration = Duration::from_secs(60);

/// Failure TTL used by [`scenario_config`].
pub const SCENARIO_FAILURE_TTL: Duration = Duration::from_secs(5);

/// Owned audience list, as passed to `authenticate`.
#[must_use]
pub fn audiences(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

/// `["api"]`.
#[must_use]
pub fn api_audience() -> Vec<String> {
    audiences(&[TEST_AUDIENCE_API])
}

/// One minute for successes, five seconds for failures, errors not cached.
#[must_use]
pub fn scenario_config() -> CacheConfig {
    CacheConfig::new(SCENARIO_SUCCESS_TTL, SCENARIO_FAILURE_TTL)
}

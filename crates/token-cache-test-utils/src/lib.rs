//! # Token Cache Test Utilities
//!
//! Shared test utilities for the `token-cache` crate.
//!
//! This crate provides:
//! - A scriptable mock verifier (MockAuthenticator) with call counting
//! - Deterministic MAC key fixtures (fixed keys for reproducible tests)
//! - Fixed tokens, audiences and the standard scenario config
//! - Custom assertions (OutcomeAssertions trait)
//! - Log capture for checking that credentials never reach the logs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use token_cache::CachedTokenAuthenticator;
//! use token_cache_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let mock = MockAuthenticator::builder()
//!         .accept(TEST_GOOD_TOKEN, TestIdentity::alice())
//!         .build();
//!     let cache = CachedTokenAuthenticator::with_key_deriver(
//!         mock,
//!         scenario_config(),
//!         test_key_deriver(1),
//!     )?;
//!
//!     cache
//!         .authenticate(&api_audience(), TEST_GOOD_TOKEN)
//!         .await
//!         .assert_authenticated_as("alice");
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod log_capture;
pub mod mock_authenticator;
pub mod test_ids;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use log_capture::*;
pub use mock_authenticator::*;
pub use test_ids::*;

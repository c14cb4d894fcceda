//! Scriptable token verifier for cache tests.
//!
//! [`MockAuthenticator`] answers per token with a configured outcome, counts
//! every call, and can simulate upstream latency so concurrent misses overlap.
//!
//! # Example
//!
//! ```rust,ignore
//! use token_cache_test_utils::*;
//!
//! let mock = MockAuthenticator::builder()
//!     .accept(TEST_GOOD_TOKEN, TestIdentity::alice())
//!     .reject(TEST_BAD_TOKEN)
//!     .fail(TEST_FLAKY_TOKEN, "identity provider timeout")
//!     .with_latency(Duration::from_millis(50))
//!     .build();
//!
//! // ... run the cache against `mock`, then:
//! assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 1);
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use token_cache::{AuthResult, TokenAuthenticator, Verdict};

/// Identity returned for accepted tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestIdentity {
    pub user: String,
    pub groups: Vec<String>,
}

impl TestIdentity {
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// `alice`, member of `admins`.
    #[must_use]
    pub fn alice() -> Self {
        Self::new("alice").with_group("admins")
    }

    /// `bob`, no groups.
    #[must_use]
    pub fn bob() -> Self {
        Self::new("bob")
    }
}

/// Error the mock verifier returns for tokens scripted to fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockVerifierError {
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Outcome the mock returns for one token.
pub type MockOutcome = AuthResult<TestIdentity, MockVerifierError>;

/// Mock verifier with scripted per-token outcomes.
#[derive(Debug)]
pub struct MockAuthenticator {
    outcomes: Mutex<HashMap<String, MockOutcome>>,
    default_outcome: MockOutcome,
    latency: Option<Duration>,
    call_count: AtomicUsize,
    calls_by_token: Mutex<HashMap<String, usize>>,
    last_audiences: Mutex<Option<Vec<String>>>,
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockAuthenticator {
    /// Create a new MockAuthenticator builder.
    #[must_use]
    pub fn builder() -> MockAuthenticatorBuilder {
        MockAuthenticatorBuilder::default()
    }

    /// Change the outcome for `token` mid-test, e.g. to simulate revocation.
    pub fn set_outcome(&self, token: &str, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(token.to_string(), outcome);
    }

    /// Total verifier calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Verifier calls for one token.
    #[must_use]
    pub fn calls_for(&self, token: &str) -> usize {
        self.calls_by_token
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(0)
    }

    /// Audiences passed on the most recent call.
    #[must_use]
    pub fn last_audiences(&self) -> Option<Vec<String>> {
        self.last_audiences.lock().unwrap().clone()
    }

    fn outcome_for(&self, token: &str) -> MockOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}

#[async_trait]
impl TokenAuthenticator for MockAuthenticator {
    type Response = TestIdentity;
    type Error = MockVerifierError;

    async fn authenticate(&self, audiences: &[String], token: &str) -> MockOutcome {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_token
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_insert(0) += 1;
        *self.last_audiences.lock().unwrap() = Some(audiences.to_vec());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.outcome_for(token)
    }
}

/// Builder for MockAuthenticator configuration.
#[derive(Debug, Default)]
pub struct MockAuthenticatorBuilder {
    outcomes: HashMap<String, MockOutcome>,
    default_outcome: Option<MockOutcome>,
    latency: Option<Duration>,
}

impl MockAuthenticatorBuilder {
    /// Accept `token` as `identity`.
    #[must_use]
    pub fn accept(mut self, token: impl Into<String>, identity: TestIdentity) -> Self {
        self.outcomes
            .insert(token.into(), Ok(Verdict::Authenticated(identity)));
        self
    }

    /// Reject `token`.
    #[must_use]
    pub fn reject(mut self, token: impl Into<String>) -> Self {
        self.outcomes.insert(token.into(), Ok(Verdict::Rejected));
        self
    }

    /// Fail verification of `token` with `message`.
    #[must_use]
    pub fn fail(mut self, token: impl Into<String>, message: impl Into<String>) -> Self {
        self.outcomes.insert(
            token.into(),
            Err(MockVerifierError::Unavailable(message.into())),
        );
        self
    }

    /// Outcome for tokens not scripted explicitly. Defaults to `Rejected`.
    #[must_use]
    pub fn otherwise(mut self, outcome: MockOutcome) -> Self {
        self.default_outcome = Some(outcome);
        self
    }

    /// Sleep this long inside every call before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Build the MockAuthenticator.
    #[must_use]
    pub fn build(self) -> MockAuthenticator {
        MockAuthenticator {
            outcomes: Mutex::new(self.outcomes),
            default_outcome: self.default_outcome.unwrap_or(Ok(Verdict::Rejected)),
            latency: self.latency,
            call_count: AtomicUsize::new(0),
            calls_by_token: Mutex::new(HashMap::new()),
            last_audiences: Mutex::new(None),
        }
    }
}

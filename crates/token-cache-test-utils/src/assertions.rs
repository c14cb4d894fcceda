//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for authentication results.

use crate::mock_authenticator::{MockOutcome, MockVerifierError, TestIdentity};
use token_cache::Verdict;

/// Custom assertions for results returned by a (cached) verifier
///
/// # Example
/// ```rust,ignore
/// cache
///     .authenticate(&api_audience(), TEST_GOOD_TOKEN)
///     .await
///     .assert_authenticated_as("alice")
///     .assert_in_group("admins");
/// ```
pub trait OutcomeAssertions {
    /// Assert the token was accepted for `user`
    fn assert_authenticated_as(&self, user: &str) -> &Self;

    /// Assert the accepted identity is in `group`
    fn assert_in_group(&self, group: &str) -> &Self;

    /// Assert the token was rejected (not an error)
    fn assert_rejected(&self) -> &Self;

    /// Assert the verifier failed with an error
    fn assert_verifier_error(&self) -> &Self;
}

fn identity(outcome: &MockOutcome) -> &TestIdentity {
    match outcome {
        Ok(Verdict::Authenticated(identity)) => identity,
        other => panic!("Expected authenticated outcome, got {other:?}"),
    }
}

impl OutcomeAssertions for MockOutcome {
    fn assert_authenticated_as(&self, user: &str) -> &Self {
        assert_eq!(identity(self).user, user, "Authenticated user mismatch");
        self
    }

    fn assert_in_group(&self, group: &str) -> &Self {
        let identity = identity(self);
        assert!(
            identity.groups.iter().any(|g| g == group),
            "Expected {} to be in group {group}, groups: {:?}",
            identity.user,
            identity.groups
        );
        self
    }

    fn assert_rejected(&self) -> &Self {
        assert!(
            matches!(self, Ok(Verdict::Rejected)),
            "Expected rejected outcome, got {self:?}"
        );
        self
    }

    fn assert_verifier_error(&self) -> &Self {
        assert!(
            matches!(self, Err(MockVerifierError::Unavailable(_))),
            "Expected verifier error, got {self:?}"
        );
        self
    }
}

//! TTL handling per outcome.

use std::sync::Arc;
use std::time::Duration;
use token_cache::{CacheConfig, CachedTokenAuthenticator};
use token_cache_test_utils::*;

const HOUR: Duration = Duration::from_secs(60 * 60);

fn mock() -> Arc<MockAuthenticator> {
    Arc::new(
        MockAuthenticator::builder()
            .accept(TEST_GOOD_TOKEN, TestIdentity::alice())
            .reject(TEST_BAD_TOKEN)
            .fail(TEST_FLAKY_TOKEN, "identity provider timeout")
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_success_reverified_after_success_ttl() {
    let mock = mock();
    let cache = CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config()).unwrap();

    cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();

    tokio::time::advance(SCENARIO_SUCCESS_TTL - Duration::from_millis(1)).await;
    cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 1, "still inside the TTL");

    tokio::time::advance(Duration::from_millis(1)).await;
    cache
        .authenticate(&api_audience(), TEST_GOOD_TOKEN)
        .await
        .assert_authenticated_as("alice");
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 2, "entry expires at exactly the TTL");
}

#[tokio::test(start_paused = true)]
async fn test_zero_failure_ttl_with_long_success_ttl() {
    let mock = mock();
    let cache =
        CachedTokenAuthenticator::new(Arc::clone(&mock), CacheConfig::new(HOUR, Duration::ZERO))
            .unwrap();

    for _ in 0..5 {
        cache
            .authenticate(&api_audience(), TEST_BAD_TOKEN)
            .await
            .assert_rejected();
    }
    assert_eq!(mock.calls_for(TEST_BAD_TOKEN), 5);

    for _ in 0..5 {
        cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
    }
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_success_ttl_with_failure_caching() {
    let mock = mock();
    let cache = CachedTokenAuthenticator::new(
        Arc::clone(&mock),
        CacheConfig::new(Duration::ZERO, HOUR),
    )
    .unwrap();

    for _ in 0..3 {
        cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
        cache.authenticate(&api_audience(), TEST_BAD_TOKEN).await.unwrap();
    }
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 3);
    assert_eq!(mock.calls_for(TEST_BAD_TOKEN), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_caching_opt_in() {
    let mock = mock();
    let cache = CachedTokenAuthenticator::new(
        Arc::clone(&mock),
        scenario_config().with_cache_errors(true),
    )
    .unwrap();

    for _ in 0..3 {
        cache
            .authenticate(&api_audience(), TEST_FLAKY_TOKEN)
            .await
            .assert_verifier_error();
    }
    assert_eq!(mock.calls_for(TEST_FLAKY_TOKEN), 1);

    tokio::time::advance(SCENARIO_FAILURE_TTL).await;
    cache
        .authenticate(&api_audience(), TEST_FLAKY_TOKEN)
        .await
        .assert_verifier_error();
    assert_eq!(mock.calls_for(TEST_FLAKY_TOKEN), 2);
}

#[tokio::test(start_paused = true)]
async fn test_revocation_visible_after_success_ttl() {
    let mock = mock();
    let cache = CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config()).unwrap();

    cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
    mock.set_outcome(TEST_GOOD_TOKEN, Ok(token_cache::Verdict::Rejected));

    // Stale acceptance inside the window.
    cache
        .authenticate(&api_audience(), TEST_GOOD_TOKEN)
        .await
        .assert_authenticated_as("alice");

    tokio::time::advance(SCENARIO_SUCCESS_TTL).await;
    cache
        .authenticate(&api_audience(), TEST_GOOD_TOKEN)
        .await
        .assert_rejected();
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_ends_staleness_early() {
    let mock = mock();
    let cache = CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config()).unwrap();

    cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
    mock.set_outcome(TEST_GOOD_TOKEN, Ok(token_cache::Verdict::Rejected));

    assert!(cache.invalidate(&api_audience(), TEST_GOOD_TOKEN));
    cache
        .authenticate(&api_audience(), TEST_GOOD_TOKEN)
        .await
        .assert_rejected();
}

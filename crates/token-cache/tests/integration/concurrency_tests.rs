//! Concurrent callers, overlapping misses and cancellation.

use std::sync::Arc;
use std::time::Duration;
use token_cache::CachedTokenAuthenticator;
use token_cache_test_utils::*;

fn slow_mock(latency: Duration) -> Arc<MockAuthenticator> {
    Arc::new(
        MockAuthenticator::builder()
            .accept(TEST_GOOD_TOKEN, TestIdentity::alice())
            .with_latency(latency)
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_each_call_verifier() {
    let mock = slow_mock(Duration::from_millis(100));
    let cache = Arc::new(
        CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config()).unwrap(),
    );

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await })
        })
        .collect();
    for task in tasks {
        task.await
            .unwrap()
            .assert_authenticated_as("alice");
    }

    // No in-flight deduplication: both overlapping misses reached the verifier.
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 2);
    assert_eq!(cache.len(), 1);

    cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_lookup_caches_nothing() {
    let mock = slow_mock(Duration::from_secs(5));
    let cache = CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config()).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        cache.authenticate(&api_audience(), TEST_GOOD_TOKEN),
    )
    .await;
    assert!(result.is_err(), "lookup should time out");
    assert!(cache.is_empty());

    cache
        .authenticate(&api_audience(), TEST_GOOD_TOKEN)
        .await
        .assert_authenticated_as("alice");
    assert_eq!(mock.calls_for(TEST_GOOD_TOKEN), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tasks_many_tokens() {
    const WORKERS: usize = 8;
    const TOKENS: usize = 16;

    let tokens: Vec<String> = (0..TOKENS).map(|i| format!("token-{i}")).collect();
    let mut builder = MockAuthenticator::builder();
    for (i, token) in tokens.iter().enumerate() {
        builder = if i % 2 == 0 {
            builder.accept(token.clone(), TestIdentity::new(format!("user-{i}")))
        } else {
            builder.reject(token.clone())
        };
    }
    let mock = Arc::new(builder.build());
    let cache = Arc::new(
        CachedTokenAuthenticator::new(Arc::clone(&mock), scenario_config().with_shard_count(4))
            .unwrap(),
    );
    let tokens = Arc::new(tokens);

    let tasks: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            let tokens = Arc::clone(&tokens);
            tokio::spawn(async move {
                for round in 0..100 {
                    let i = (worker + round) % TOKENS;
                    let result = cache.authenticate(&api_audience(), &tokens[i]).await;
                    if i % 2 == 0 {
                        result.assert_authenticated_as(&format!("user-{i}"));
                    } else {
                        result.assert_rejected();
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(cache.len(), TOKENS);
    for token in tokens.iter() {
        let calls = mock.calls_for(token);
        assert!(
            (1..=WORKERS).contains(&calls),
            "{token} verified {calls} times"
        );
    }
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, (WORKERS * 100) as u64);
    assert_eq!(stats.misses, mock.call_count() as u64);
}

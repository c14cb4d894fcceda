//! Sweeper, capacity bound, stats and environment-driven config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use token_cache::config::{ENV_MAX_ENTRIES_PER_SHARD, ENV_SHARD_COUNT, ENV_SWEEP_INTERVAL_SECONDS};
use token_cache::{CacheConfig, CacheStats, CachedTokenAuthenticator, Verdict};
use token_cache_test_utils::*;

fn accept_everything() -> Arc<MockAuthenticator> {
    Arc::new(
        MockAuthenticator::builder()
            .otherwise(Ok(Verdict::Authenticated(TestIdentity::bob())))
            .build(),
    )
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_reclaims_unlooked_up_entries() {
    let cache = CachedTokenAuthenticator::new(
        accept_everything(),
        scenario_config().with_sweep_interval(Duration::from_secs(30)),
    )
    .unwrap();
    let sweeper = cache.spawn_sweeper().unwrap().expect("interval configured");

    for i in 0..20 {
        cache
            .authenticate(&api_audience(), &format!("one-shot-{i}"))
            .await
            .unwrap();
    }
    assert_eq!(cache.len(), 20);

    tokio::time::advance(SCENARIO_SUCCESS_TTL + Duration::from_secs(1)).await;
    settle().await;

    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 20);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_stops_when_cache_dropped() {
    let cache = CachedTokenAuthenticator::new(
        accept_everything(),
        scenario_config().with_sweep_interval(Duration::from_secs(1)),
    )
    .unwrap();
    let sweeper = cache.spawn_sweeper().unwrap().unwrap();

    drop(cache);

    tokio::time::timeout(Duration::from_secs(10), sweeper)
        .await
        .expect("sweeper should exit once the cache is gone")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_capacity_bound_limits_entries() {
    let mock = accept_everything();
    let cache = CachedTokenAuthenticator::new(
        Arc::clone(&mock),
        scenario_config()
            .with_shard_count(1)
            .with_max_entries_per_shard(3),
    )
    .unwrap();

    for i in 0..3 {
        cache
            .authenticate(&api_audience(), &format!("token-{i}"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    cache.authenticate(&api_audience(), "token-3").await.unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().evictions, 1);

    // token-0 expired earliest and was evicted; token-3 is cached.
    cache.authenticate(&api_audience(), "token-3").await.unwrap();
    assert_eq!(mock.calls_for("token-3"), 1);
    cache.authenticate(&api_audience(), "token-0").await.unwrap();
    assert_eq!(mock.calls_for("token-0"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stats_track_hits_misses_and_purges() {
    let cache = CachedTokenAuthenticator::new(
        Arc::new(
            MockAuthenticator::builder()
                .accept(TEST_GOOD_TOKEN, TestIdentity::alice())
                .reject(TEST_BAD_TOKEN)
                .build(),
        ),
        scenario_config(),
    )
    .unwrap();

    for _ in 0..3 {
        cache.authenticate(&api_audience(), TEST_GOOD_TOKEN).await.unwrap();
        cache.authenticate(&api_audience(), TEST_BAD_TOKEN).await.unwrap();
    }
    tokio::time::advance(SCENARIO_FAILURE_TTL).await;
    assert_eq!(cache.purge_expired(), 1);

    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 4,
            misses: 2,
            evictions: 1,
            entries: 1,
        }
    );
}

#[test]
fn test_config_from_vars_builds_cache() {
    let vars: HashMap<String, String> = [
        (ENV_SHARD_COUNT, "2"),
        (ENV_MAX_ENTRIES_PER_SHARD, "100"),
        (ENV_SWEEP_INTERVAL_SECONDS, "15"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = CacheConfig::from_vars(&vars).unwrap();
    let cache = CachedTokenAuthenticator::new(accept_everything(), config).unwrap();

    assert_eq!(cache.config().shard_count, 2);
    assert_eq!(cache.config().max_entries_per_shard, Some(100));
    assert_eq!(cache.config().sweep_interval, Some(Duration::from_secs(15)));
}

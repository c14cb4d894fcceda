//! Tokens, audiences and key material never reach logs or debug output.

use std::sync::Arc;
use token_cache::{CacheConfig, CachedTokenAuthenticator};
use token_cache_test_utils::*;

const SENSITIVE_TOKEN: &str = "eyJhbGciOiJSUzI1NiJ9.sensitive-payload.signature";
const SENSITIVE_AUDIENCE: &str = "https://internal-billing.example.com";

#[tokio::test(start_paused = true)]
async fn test_credentials_not_logged() {
    let (logs, _guard) = capture_logs();

    let mock = Arc::new(
        MockAuthenticator::builder()
            .accept(SENSITIVE_TOKEN, TestIdentity::alice())
            .build(),
    );
    let cache = CachedTokenAuthenticator::new(
        mock,
        CacheConfig::default().with_cache_errors(true),
    )
    .unwrap();
    let audience = audiences(&[SENSITIVE_AUDIENCE]);

    cache.authenticate(&audience, SENSITIVE_TOKEN).await.unwrap();
    cache.authenticate(&audience, SENSITIVE_TOKEN).await.unwrap();
    cache.invalidate(&audience, SENSITIVE_TOKEN);
    cache.authenticate(&audience, "another-token").await.unwrap();

    let contents = logs.contents();
    assert!(contents.contains("Token cache hit"), "logs:\n{contents}");
    assert!(contents.contains("Token cache miss"), "logs:\n{contents}");
    logs.assert_not_logged(SENSITIVE_TOKEN);
    logs.assert_not_logged("sensitive-payload");
    logs.assert_not_logged(SENSITIVE_AUDIENCE);
    logs.assert_not_logged("another-token");
}

#[test]
fn test_debug_output_has_no_key_material() {
    let cache = CachedTokenAuthenticator::with_key_deriver(
        MockAuthenticator::default(),
        CacheConfig::default(),
        test_key_deriver(1),
    )
    .unwrap();

    let debug = format!("{cache:?}");
    assert!(debug.contains("[REDACTED]"));

    let key = test_key_deriver(1).derive(&[SENSITIVE_AUDIENCE], SENSITIVE_TOKEN);
    let key_hex: String = key.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
    assert!(!debug.contains(&key_hex));
    assert_eq!(format!("{key:?}"), format!("CacheKey({:?})", key.correlation_id()));
}

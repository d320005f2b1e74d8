#![cfg(feature = "serde")]

use rate_guard_keyed::cores::{EvictionPolicy, TokenBucketCoreConfig};
use std::num::NonZeroUsize;
use std::time::Duration;

#[test]
fn token_bucket_config_round_trip() {
    let config = TokenBucketCoreConfig::new(25, Duration::from_millis(1500));

    let json = serde_json::to_string(&config).unwrap();
    let decoded: TokenBucketCoreConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, config);
}

#[test]
fn token_bucket_config_from_json() {
    let json = r#"{"capacity":10,"refill_interval":{"secs":2,"nanos":500000000}}"#;
    let config: TokenBucketCoreConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.capacity, 10);
    assert_eq!(config.refill_interval, Duration::from_millis(2500));
    assert!(config.validate().is_ok());
}

#[test]
fn eviction_policy_round_trip() {
    let policy = EvictionPolicy::never()
        .with_max_identities(NonZeroUsize::new(512).unwrap())
        .with_idle_timeout(Duration::from_secs(90));

    let json = serde_json::to_string(&policy).unwrap();
    let decoded: EvictionPolicy = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, policy);

    let never: EvictionPolicy =
        serde_json::from_str(r#"{"max_identities":null,"idle_timeout":null}"#).unwrap();
    assert_eq!(never, EvictionPolicy::never());
}

#[test]
fn eviction_policy_rejects_zero_max_identities() {
    let result: Result<EvictionPolicy, _> =
        serde_json::from_str(r#"{"max_identities":0,"idle_timeout":null}"#);
    assert!(result.is_err());
}

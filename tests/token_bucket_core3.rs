use rate_guard_keyed::clock::{Clock, ManualClock};
use rate_guard_keyed::cores::{TokenBucketCore, TokenBucketCoreConfig};
use rate_guard_keyed::{ConfigError, RateLimited};
use std::time::Duration;

#[test]
fn try_new_rejects_zero_capacity() {
    let result = TokenBucketCore::try_new(0, Duration::from_secs(1));
    assert_eq!(result.err(), Some(ConfigError::ZeroCapacity));
}

#[test]
fn try_new_rejects_zero_refill_interval() {
    let result = TokenBucketCore::try_new(5, Duration::ZERO);
    assert_eq!(result.err(), Some(ConfigError::ZeroRefillInterval));
}

#[test]
fn config_validate_and_build() {
    assert_eq!(
        TokenBucketCoreConfig::new(0, Duration::ZERO).validate(),
        Err(ConfigError::ZeroCapacity)
    );
    assert!(TokenBucketCoreConfig::new(0, Duration::from_secs(1))
        .try_build()
        .is_err());

    let clock = ManualClock::new();
    let bucket = TokenBucketCoreConfig::new(3, Duration::from_secs(1))
        .try_build_with_clock(clock)
        .unwrap();
    assert_eq!(bucket.tokens_available(), 3);
}

#[test]
fn denial_reports_time_until_next_token() {
    let clock = ManualClock::new();
    let bucket = TokenBucketCore::with_clock(1, Duration::from_secs(1), clock.clone());
    assert_eq!(bucket.try_allow(), Ok(()));

    clock.advance(Duration::from_millis(300));
    assert_eq!(
        bucket.try_allow(),
        Err(RateLimited {
            available: 0,
            retry_after: Duration::from_millis(700),
        })
    );

    // Waiting exactly retry_after succeeds
    clock.advance(Duration::from_millis(700));
    assert_eq!(bucket.try_allow(), Ok(()));
}

#[test]
fn denial_at_earlier_instant_reports_full_interval() {
    let clock = ManualClock::new();
    let bucket = TokenBucketCore::with_clock(1, Duration::from_secs(2), clock.clone());
    let start = clock.now();
    clock.advance(Duration::from_secs(1));
    assert!(bucket.allow());

    let err = bucket.try_allow_at(start).unwrap_err();
    assert_eq!(err.retry_after, Duration::from_secs(2));
}

#[test]
fn rate_limited_display() {
    let err = RateLimited {
        available: 0,
        retry_after: Duration::from_millis(250),
    };
    assert_eq!(
        err.to_string(),
        "rate limited: 0 token(s) available, retry after 250ms"
    );
    assert_eq!(
        ConfigError::ZeroRefillInterval.to_string(),
        "refill_interval must be greater than 0"
    );
}

use rate_guard_keyed::clock::ManualClock;
use rate_guard_keyed::cores::{EvictionPolicy, IdentityRegistry, TokenBucketCore, TokenBucketCoreConfig};
use rate_guard_keyed::{ConfigError, KeyedRateLimiterCore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(1);

fn new_registry(capacity: u64) -> (IdentityRegistry<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let registry = IdentityRegistry::with_clock(
        TokenBucketCoreConfig::new(capacity as _, INTERVAL),
        EvictionPolicy::never(),
        clock.clone(),
    );
    (registry, clock)
}

#[test]
fn starts_empty_and_creates_on_first_sight() {
    let (registry, _clock) = new_registry(3);
    assert!(registry.is_empty());

    assert!(registry.allow_for_identity("alice"));
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("alice"));
    assert!(!registry.contains("bob"));
}

#[test]
fn identities_have_independent_budgets() {
    let (registry, _clock) = new_registry(2);

    // Exhaust alice
    assert!(registry.allow_for_identity("alice"));
    assert!(registry.allow_for_identity("alice"));
    assert!(!registry.allow_for_identity("alice"));

    // bob is unaffected
    assert!(registry.allow_for_identity("bob"));
    assert!(registry.allow_for_identity("bob"));
    assert!(!registry.allow_for_identity("bob"));
}

#[test]
fn repeated_lookups_reuse_the_same_bucket() {
    let (registry, _clock) = new_registry(3);

    let first = registry.bucket_for("alice");
    let second = registry.bucket_for("alice");
    assert!(Arc::ptr_eq(&first, &second));

    // Budget depletes cumulatively across calls
    assert!(registry.allow_for_identity("alice"));
    assert_eq!(first.current_tokens(), 2);
    assert!(registry.allow_for_identity("alice"));
    assert!(registry.allow_for_identity("alice"));
    assert!(!registry.allow_for_identity("alice"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn identity_buckets_refill_from_the_shared_clock() {
    let (registry, clock) = new_registry(1);
    assert!(registry.allow_for_identity("alice"));
    assert!(!registry.allow_for_identity("alice"));

    clock.advance(INTERVAL / 2);
    assert!(!registry.allow_for_identity("alice"));

    clock.advance(INTERVAL / 2);
    assert!(registry.allow_for_identity("alice"));
}

#[test]
fn empty_identity_is_an_ordinary_key() {
    let (registry, _clock) = new_registry(1);
    assert!(registry.allow_for_identity(""));
    assert!(!registry.allow_for_identity(""));
    assert!(registry.contains(""));
    assert!(registry.allow_for_identity("alice"));
}

#[test]
fn verbose_denial_for_identity() {
    let (registry, clock) = new_registry(1);
    assert_eq!(registry.try_allow_for_identity("alice"), Ok(()));

    clock.advance(Duration::from_millis(100));
    let err = registry.try_allow_for_identity("alice").unwrap_err();
    assert_eq!(err.available, 0);
    assert_eq!(err.retry_after, Duration::from_millis(900));
}

#[test]
fn policy_comes_from_registry_not_call_site() {
    let (registry, _clock) = new_registry(2);
    assert_eq!(registry.policy(), TokenBucketCoreConfig::new(2, INTERVAL));

    let bucket = registry.bucket_for("alice");
    assert_eq!(bucket.capacity(), 2);
    assert_eq!(bucket.refill_interval(), INTERVAL);
}

#[test]
fn registry_from_template_bucket() {
    let template = TokenBucketCore::new(4, Duration::from_millis(250));
    let registry = IdentityRegistry::from_template(&template, EvictionPolicy::never());

    assert_eq!(registry.policy(), template.config());
    assert_eq!(registry.bucket_for("alice").capacity(), 4);

    // Consuming from the template does not touch identity budgets
    assert!(template.allow());
    assert_eq!(registry.bucket_for("alice").current_tokens(), 4);
}

#[test]
#[should_panic(expected = "capacity must be greater than 0")]
fn new_with_zero_capacity_panics() {
    IdentityRegistry::new(
        TokenBucketCoreConfig::new(0, INTERVAL),
        EvictionPolicy::never(),
    );
}

#[test]
fn try_new_rejects_invalid_policy() {
    let result = IdentityRegistry::try_new(
        TokenBucketCoreConfig::new(1, Duration::ZERO),
        EvictionPolicy::never(),
    );
    assert!(matches!(result, Err(ConfigError::ZeroRefillInterval)));

    let result = IdentityRegistry::try_new(
        TokenBucketCoreConfig::new(1, INTERVAL),
        EvictionPolicy::idle_timeout(Duration::ZERO),
    );
    assert_eq!(result.unwrap_err(), ConfigError::ZeroIdleTimeout);
}

#[test]
fn registry_usable_through_trait_object() {
    let (registry, _clock) = new_registry(1);
    let limiter: &dyn KeyedRateLimiterCore = &registry;

    assert!(limiter.allow_for_identity("alice"));
    assert!(!limiter.allow_for_identity("alice"));
    assert!(limiter.try_allow_for_identity("bob").is_ok());
}

#[test]
fn concurrent_same_identity_uses_one_bucket() {
    const THREADS: usize = 32;
    let (registry, _clock) = new_registry(5);
    let registry = Arc::new(registry);
    let barrier = Arc::new(Barrier::new(THREADS));
    let allowed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            let allowed = Arc::clone(&allowed);
            thread::spawn(move || {
                barrier.wait();
                if registry.allow_for_identity("shared") {
                    allowed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(allowed.load(Ordering::SeqCst), 5);
    assert_eq!(registry.len(), 1);
}

#[test]
fn concurrent_distinct_identities_each_get_full_budget() {
    const IDENTITIES: usize = 8;
    const CALLS: usize = 10;
    let (registry, _clock) = new_registry(3);
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..IDENTITIES)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let identity = format!("user-{}", i);
                (0..CALLS)
                    .filter(|_| registry.allow_for_identity(&identity))
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
    assert_eq!(registry.len(), IDENTITIES);
}

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use lru::LruCache;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::cores::{TokenBucketCore, TokenBucketCoreConfig};
use crate::rate_limiter_core::KeyedRateLimiterCore;
use crate::{AllowResult, ConfigError};

/// Per-identity token buckets created on first sight from a single policy.
///
/// Every identity gets its own [`TokenBucketCore`] built from the registry's
/// policy the first time it is seen. All later decisions for that identity go
/// through the same bucket until the identity is evicted.
///
/// Eviction ends that guarantee for the evicted identity. A caller still holding
/// the old bucket (from [`bucket_for`](Self::bucket_for) or a decision in
/// flight) keeps using it, while the next lookup creates a fresh, full bucket.
///
/// The registry lock only covers lookup, creation and eviction. The decision
/// itself runs on the identity's own bucket lock after the registry lock is
/// released, so different identities never wait on each other's decisions.
///
/// # Example
///
/// ```rust
/// use rate_guard_keyed::cores::{EvictionPolicy, IdentityRegistry, TokenBucketCoreConfig};
/// use std::time::Duration;
///
/// let policy = TokenBucketCoreConfig::new(2, Duration::from_secs(1));
/// let registry = IdentityRegistry::new(policy, EvictionPolicy::never());
///
/// assert!(registry.allow_for_identity("alice"));
/// assert!(registry.allow_for_identity("alice"));
/// assert!(!registry.allow_for_identity("alice"));
///
/// // bob is tracked separately
/// assert!(registry.allow_for_identity("bob"));
/// ```
pub struct IdentityRegistry<C: Clock + Clone = SystemClock> {
    policy: TokenBucketCoreConfig,
    eviction: EvictionPolicy,
    clock: C,
    buckets: Mutex<LruCache<String, IdentityEntry<C>>>,
}

struct IdentityEntry<C: Clock> {
    bucket: Arc<TokenBucketCore<C>>,
    /// Last lookup of this identity, read from the registry clock.
    last_seen: Instant,
}

impl<C: Clock + Clone> fmt::Debug for IdentityRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("policy", &self.policy)
            .field("eviction", &self.eviction)
            .field("identities", &self.len())
            .finish()
    }
}

impl<C: Clock + Clone> KeyedRateLimiterCore for IdentityRegistry<C> {
    #[inline(always)]
    fn try_allow_for_identity(&self, identity: &str) -> AllowResult {
        IdentityRegistry::try_allow_for_identity(self, identity)
    }

    #[inline(always)]
    fn allow_for_identity(&self, identity: &str) -> bool {
        IdentityRegistry::allow_for_identity(self, identity)
    }
}

impl IdentityRegistry<SystemClock> {
    /// Creates an empty registry driven by the system clock.
    ///
    /// # Panics
    ///
    /// Panics if the policy has a zero capacity or refill interval, or the
    /// eviction policy has a zero idle timeout.
    pub fn new(policy: TokenBucketCoreConfig, eviction: EvictionPolicy) -> Self {
        Self::with_clock(policy, eviction, SystemClock)
    }

    /// Creates an empty registry driven by the system clock, rejecting an
    /// invalid policy.
    pub fn try_new(
        policy: TokenBucketCoreConfig,
        eviction: EvictionPolicy,
    ) -> Result<Self, ConfigError> {
        Self::try_with_clock(policy, eviction, SystemClock)
    }

    /// Creates an empty registry whose per-identity policy is copied from
    /// `template`'s capacity and refill interval.
    ///
    /// ```rust
    /// use rate_guard_keyed::cores::{EvictionPolicy, IdentityRegistry, TokenBucketCore};
    /// use std::time::Duration;
    ///
    /// let global = TokenBucketCore::new(5, Duration::from_secs(1));
    /// let per_user = IdentityRegistry::from_template(&global, EvictionPolicy::never());
    /// assert_eq!(per_user.policy(), global.config());
    /// ```
    pub fn from_template<T: Clock>(template: &TokenBucketCore<T>, eviction: EvictionPolicy) -> Self {
        Self::new(template.config(), eviction)
    }
}

impl<C: Clock + Clone> IdentityRegistry<C> {
    /// Creates an empty registry whose buckets read `clock`.
    ///
    /// # Panics
    ///
    /// Panics if the policy has a zero capacity or refill interval, or the
    /// eviction policy has a zero idle timeout.
    pub fn with_clock(policy: TokenBucketCoreConfig, eviction: EvictionPolicy, clock: C) -> Self {
        match Self::try_with_clock(policy, eviction, clock) {
            Ok(registry) => registry,
            Err(e) => panic!("{}", e),
        }
    }

    /// Creates an empty registry whose buckets read `clock`, rejecting an
    /// invalid policy.
    pub fn try_with_clock(
        policy: TokenBucketCoreConfig,
        eviction: EvictionPolicy,
        clock: C,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        eviction.validate()?;

        let buckets = match eviction.max_identities {
            Some(max) => LruCache::new(max),
            None => LruCache::unbounded(),
        };

        Ok(Self {
            policy,
            eviction,
            clock,
            buckets: Mutex::new(buckets),
        })
    }

    /// Consumes one token from `identity`'s bucket if available, creating a
    /// full bucket for identities seen for the first time.
    ///
    /// The empty string is an ordinary identity.
    #[inline]
    pub fn allow_for_identity(&self, identity: &str) -> bool {
        self.bucket_for(identity).allow()
    }

    /// Consumes one token from `identity`'s bucket if available, returning
    /// diagnostics on denial.
    #[inline]
    pub fn try_allow_for_identity(&self, identity: &str) -> AllowResult {
        self.bucket_for(identity).try_allow()
    }

    /// Returns `identity`'s bucket, creating it from the policy if absent.
    ///
    /// Creating a bucket may evict the least recently used identity (when a
    /// maximum is configured) and identities idle for at least the idle
    /// timeout (when one is configured).
    pub fn bucket_for(&self, identity: &str) -> Arc<TokenBucketCore<C>> {
        let mut buckets = self.buckets.lock();
        // Read under the lock so `last_seen` follows LRU order.
        let now = self.clock.now();

        if let Some(entry) = buckets.get_mut(identity) {
            entry.last_seen = now;
            trace!("reusing bucket for identity {:?}", identity);
            return Arc::clone(&entry.bucket);
        }

        self.sweep_idle(&mut buckets, now);

        let bucket = Arc::new(TokenBucketCore::with_clock(
            self.policy.capacity,
            self.policy.refill_interval,
            self.clock.clone(),
        ));
        let entry = IdentityEntry {
            bucket: Arc::clone(&bucket),
            last_seen: now,
        };

        // The key is absent, so anything pushed out is an LRU eviction.
        if let Some((evicted, _)) = buckets.push(identity.to_owned(), entry) {
            debug!("identity limit reached, evicted {:?}", evicted);
        }
        debug!(
            "created bucket for identity {:?} ({} tracked)",
            identity,
            buckets.len()
        );

        bucket
    }

    /// Removes identities whose last lookup is at least the idle timeout old.
    ///
    /// # Returns
    /// The number of identities removed; always 0 without an idle timeout.
    pub fn evict_idle(&self) -> usize {
        let mut buckets = self.buckets.lock();
        let now = self.clock.now();
        self.sweep_idle(&mut buckets, now)
    }

    /// Forgets `identity`. Its next decision starts from a full bucket.
    pub fn remove(&self, identity: &str) -> bool {
        self.buckets.lock().pop(identity).is_some()
    }

    /// Forgets every identity.
    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    /// Whether `identity` currently has a bucket. Does not count as a lookup.
    pub fn contains(&self, identity: &str) -> bool {
        self.buckets.lock().contains(identity)
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Whether no identity is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The policy new identities are created from.
    pub fn policy(&self) -> TokenBucketCoreConfig {
        self.policy
    }

    /// The policy bounding how many identities are kept.
    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }

    /// Pops idle identities from the cold end of the cache.
    ///
    /// Lookups promote entries and refresh `last_seen` together, so the cache's
    /// LRU order is also `last_seen` order and the sweep can stop at the first
    /// entry that is still active.
    fn sweep_idle(&self, buckets: &mut LruCache<String, IdentityEntry<C>>, now: Instant) -> usize {
        let idle_timeout = match self.eviction.idle_timeout {
            Some(timeout) => timeout,
            None => return 0,
        };

        let mut evicted = 0;
        loop {
            let idle = match buckets.peek_lru() {
                Some((_, entry)) => now.saturating_duration_since(entry.last_seen) >= idle_timeout,
                None => false,
            };
            if !idle {
                break;
            }
            if let Some((identity, _)) = buckets.pop_lru() {
                debug!("evicted idle identity {:?}", identity);
                evicted += 1;
            }
        }
        evicted
    }
}

/// How an [`IdentityRegistry`] bounds the number of identities it tracks.
///
/// The default never evicts. Both limits may be combined.
///
/// ```rust
/// use rate_guard_keyed::cores::EvictionPolicy;
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
///
/// let policy = EvictionPolicy::never()
///     .with_max_identities(NonZeroUsize::new(10_000).unwrap())
///     .with_idle_timeout(Duration::from_secs(600));
/// assert_eq!(policy.idle_timeout, Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvictionPolicy {
    /// Evict the least recently used identity when inserting beyond this count.
    pub max_identities: Option<NonZeroUsize>,
    /// Evict identities not looked up for at least this long.
    pub idle_timeout: Option<Duration>,
}

impl EvictionPolicy {
    /// Keep every identity for the registry's lifetime.
    pub fn never() -> Self {
        Self::default()
    }

    /// Keep at most `max` identities, evicting the least recently used.
    pub fn max_identities(max: NonZeroUsize) -> Self {
        Self::never().with_max_identities(max)
    }

    /// Evict identities idle for at least `timeout`.
    pub fn idle_timeout(timeout: Duration) -> Self {
        Self::never().with_idle_timeout(timeout)
    }

    /// Sets the least-recently-used bound.
    pub fn with_max_identities(mut self, max: NonZeroUsize) -> Self {
        self.max_identities = Some(max);
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Checks that the idle timeout, if any, is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.idle_timeout {
            Some(timeout) if timeout.is_zero() => Err(ConfigError::ZeroIdleTimeout),
            _ => Ok(()),
        }
    }
}

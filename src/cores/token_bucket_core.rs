use std::time::{Duration, Instant};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::rate_limiter_core::RateLimiterCore;
use crate::{AllowResult, ConfigError, RateLimited, Uint};

/// Core implementation of the token bucket rate limiting algorithm.
///
/// The bucket holds up to `capacity` tokens and credits one token for every whole
/// `refill_interval` observed between decisions. Each allowed action consumes
/// exactly one token; when the bucket is empty the action is rejected.
///
/// # Algorithm Behavior
///
/// - The bucket starts full with `capacity` tokens
/// - No timer runs; elapsed time is read from the clock on each decision
/// - `floor(elapsed / refill_interval)` tokens are credited, clamped to `capacity`
/// - The last-refill instant only moves when at least one token is credited,
///   so partial intervals accumulate across calls
/// - Refill and consumption happen under one lock acquisition
///
/// # Example
///
/// ```rust
/// use rate_guard_keyed::clock::ManualClock;
/// use rate_guard_keyed::cores::TokenBucketCore;
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let bucket = TokenBucketCore::with_clock(2, Duration::from_secs(1), clock.clone());
///
/// // Use both initial tokens
/// assert!(bucket.allow());
/// assert!(bucket.allow());
///
/// // Should fail - no tokens left
/// assert!(!bucket.allow());
///
/// // After one refill interval, one token is credited
/// clock.advance(Duration::from_secs(1));
/// assert!(bucket.allow());
/// ```
#[derive(Debug)]
pub struct TokenBucketCore<C: Clock = SystemClock> {
    /// Maximum number of tokens the bucket can hold
    capacity: Uint,
    /// Time that must elapse to credit one token
    refill_interval: Duration,
    /// Source of the current instant
    clock: C,
    /// Internal state protected by mutex for thread safety
    state: Mutex<TokenBucketCoreState>,
}

/// Internal state of the token bucket
#[derive(Debug)]
struct TokenBucketCoreState {
    /// Current number of tokens available in the bucket
    available: Uint,
    /// Instant of the most recent credit
    last_refill_at: Instant,
}

impl<C: Clock> RateLimiterCore for TokenBucketCore<C> {
    #[inline(always)]
    fn try_allow(&self) -> AllowResult {
        TokenBucketCore::try_allow(self)
    }

    #[inline(always)]
    fn allow(&self) -> bool {
        TokenBucketCore::allow(self)
    }

    #[inline(always)]
    fn tokens_available(&self) -> Uint {
        TokenBucketCore::tokens_available(self)
    }
}

impl TokenBucketCore<SystemClock> {
    /// Creates a full bucket driven by the system clock.
    ///
    /// # Parameters
    ///
    /// * `capacity` - Maximum number of tokens the bucket can hold
    /// * `refill_interval` - Time that must elapse to credit one token
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `refill_interval` is zero.
    /// Use [`try_new`](Self::try_new) for unvalidated input.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rate_guard_keyed::cores::TokenBucketCore;
    /// use std::time::Duration;
    ///
    /// let bucket = TokenBucketCore::new(100, Duration::from_millis(10));
    /// assert!(bucket.allow());
    /// ```
    pub fn new(capacity: Uint, refill_interval: Duration) -> Self {
        Self::with_clock(capacity, refill_interval, SystemClock)
    }

    /// Creates a full bucket driven by the system clock, rejecting a zero
    /// capacity or zero refill interval.
    pub fn try_new(capacity: Uint, refill_interval: Duration) -> Result<Self, ConfigError> {
        Self::try_with_clock(capacity, refill_interval, SystemClock)
    }
}

impl<C: Clock> TokenBucketCore<C> {
    /// Creates a full bucket that reads time from `clock`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `refill_interval` is zero.
    pub fn with_clock(capacity: Uint, refill_interval: Duration, clock: C) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(
            !refill_interval.is_zero(),
            "refill_interval must be greater than 0"
        );

        Self::build(capacity, refill_interval, clock)
    }

    /// Creates a full bucket that reads time from `clock`, rejecting a zero
    /// capacity or zero refill interval.
    pub fn try_with_clock(
        capacity: Uint,
        refill_interval: Duration,
        clock: C,
    ) -> Result<Self, ConfigError> {
        TokenBucketCoreConfig::new(capacity, refill_interval).validate()?;
        Ok(Self::build(capacity, refill_interval, clock))
    }

    fn build(capacity: Uint, refill_interval: Duration, clock: C) -> Self {
        let now = clock.now();
        TokenBucketCore {
            capacity,
            refill_interval,
            clock,
            state: Mutex::new(TokenBucketCoreState {
                available: capacity, // Bucket starts full
                last_refill_at: now,
            }),
        }
    }

    /// Consumes one token if available, reading the current time from the clock.
    ///
    /// # Returns
    /// `true` if the action may proceed, `false` if it must be rejected.
    #[inline(always)]
    pub fn allow(&self) -> bool {
        self.allow_at(self.clock.now())
    }

    /// Consumes one token if available at the given instant.
    ///
    /// An instant earlier than the most recent credit is treated as "no time
    /// has elapsed": nothing is credited and the bucket's timeline never moves
    /// backwards.
    #[inline(always)]
    pub fn allow_at(&self, now: Instant) -> bool {
        self.try_allow_at(now).is_ok()
    }

    /// Consumes one token if available, returning diagnostics on denial.
    #[inline(always)]
    pub fn try_allow(&self) -> AllowResult {
        self.try_allow_at(self.clock.now())
    }

    /// Consumes one token if available at the given instant, returning
    /// diagnostics on denial.
    ///
    /// # Returns
    /// * `Ok(())` - One token was consumed
    /// * `Err(RateLimited)` - The bucket is empty; `retry_after` is the time left
    ///   until the next whole refill interval completes
    ///
    /// # Example
    /// ```
    /// use rate_guard_keyed::clock::{Clock, ManualClock};
    /// use rate_guard_keyed::cores::TokenBucketCore;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new();
    /// let bucket = TokenBucketCore::with_clock(1, Duration::from_secs(1), clock.clone());
    /// assert_eq!(bucket.try_allow(), Ok(()));
    ///
    /// clock.advance(Duration::from_millis(400));
    /// let denied = bucket.try_allow_at(clock.now()).unwrap_err();
    /// assert_eq!(denied.available, 0);
    /// assert_eq!(denied.retry_after, Duration::from_millis(600));
    /// ```
    pub fn try_allow_at(&self, now: Instant) -> AllowResult {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.available > 0 {
            state.available -= 1;
            trace!("token consumed, {} remaining", state.available);
            Ok(())
        } else {
            let elapsed = now.saturating_duration_since(state.last_refill_at);
            let retry_after = self.refill_interval.saturating_sub(elapsed);
            debug!("bucket empty, retry after {:?}", retry_after);
            Err(RateLimited {
                available: state.available,
                retry_after,
            })
        }
    }

    /// Gets the current number of tokens after crediting elapsed time.
    #[inline]
    pub fn tokens_available(&self) -> Uint {
        self.tokens_available_at(self.clock.now())
    }

    /// Gets the number of tokens at the given instant after crediting elapsed time.
    pub fn tokens_available_at(&self, now: Instant) -> Uint {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.available
    }

    /// Gets the current token count without crediting elapsed time.
    #[inline]
    pub fn current_tokens(&self) -> Uint {
        self.state.lock().available
    }

    /// Maximum number of tokens the bucket can hold.
    #[inline]
    pub fn capacity(&self) -> Uint {
        self.capacity
    }

    /// Time that must elapse to credit one token.
    #[inline]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// The parameters this bucket was built with.
    pub fn config(&self) -> TokenBucketCoreConfig {
        TokenBucketCoreConfig::new(self.capacity, self.refill_interval)
    }

    /// The clock this bucket reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Credits `floor(elapsed / refill_interval)` tokens, capped at capacity.
    ///
    /// `last_refill_at` is left alone when nothing is credited so that the
    /// partial interval carries into the next call.
    #[inline(always)]
    fn refill(&self, state: &mut TokenBucketCoreState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill_at);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos();

        if intervals > 0 {
            let credited = Uint::try_from(intervals).unwrap_or(Uint::MAX);
            state.available = state.available.saturating_add(credited).min(self.capacity);
            state.last_refill_at = now;
        }
    }
}

/// Configuration structure for creating a `TokenBucketCore` limiter.
///
/// Also serves as the named per-identity policy of an
/// [`IdentityRegistry`](crate::cores::IdentityRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenBucketCoreConfig {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: Uint,
    /// Time that must elapse to credit one token.
    pub refill_interval: Duration,
}

impl TokenBucketCoreConfig {
    /// Creates a new configuration instance.
    pub fn new(capacity: Uint, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
        }
    }

    /// Checks that the configuration describes a usable bucket.
    ///
    /// ```
    /// use rate_guard_keyed::cores::TokenBucketCoreConfig;
    /// use rate_guard_keyed::ConfigError;
    /// use std::time::Duration;
    ///
    /// let config = TokenBucketCoreConfig::new(10, Duration::ZERO);
    /// assert_eq!(config.validate(), Err(ConfigError::ZeroRefillInterval));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigError::ZeroRefillInterval);
        }
        Ok(())
    }

    /// Builds a full bucket from this configuration, rejecting invalid values.
    pub fn try_build(self) -> Result<TokenBucketCore, ConfigError> {
        TokenBucketCore::try_new(self.capacity, self.refill_interval)
    }

    /// Builds a full bucket reading `clock`, rejecting invalid values.
    pub fn try_build_with_clock<C: Clock>(self, clock: C) -> Result<TokenBucketCore<C>, ConfigError> {
        TokenBucketCore::try_with_clock(self.capacity, self.refill_interval, clock)
    }
}

impl From<TokenBucketCoreConfig> for TokenBucketCore {
    /// Converts a `TokenBucketCoreConfig` into a `TokenBucketCore` instance.
    ///
    /// # Panics
    /// This method will panic if the capacity or refill interval is zero.
    /// It is intended for use with validated or hardcoded input.
    ///
    /// # Examples
    ///
    /// ```
    /// use rate_guard_keyed::cores::{TokenBucketCore, TokenBucketCoreConfig};
    /// use std::time::Duration;
    ///
    /// let limiter: TokenBucketCore = TokenBucketCoreConfig {
    ///     capacity: 100,
    ///     refill_interval: Duration::from_millis(50),
    /// }.into();
    /// assert_eq!(limiter.capacity(), 100);
    /// ```
    #[inline(always)]
    fn from(config: TokenBucketCoreConfig) -> Self {
        TokenBucketCore::new(config.capacity, config.refill_interval)
    }
}

//! Per-identity token bucket rate limiting.
//!
//! This library answers one question for a caller: may this action proceed now?
//! Budgets replenish one token per refill interval up to a fixed capacity, and
//! can be shared globally or tracked per caller identity. All implementations
//! are thread-safe, in-memory and never block on anything but a short lock.
//!
//! # Quick Start
//!
//! ```rust
//! use rate_guard_keyed::cores::TokenBucketCore;
//! use std::time::Duration;
//!
//! // Create a bucket holding 5 tokens, crediting one token every second
//! let limiter = TokenBucketCore::new(5, Duration::from_secs(1));
//!
//! if limiter.allow() {
//!     println!("Request allowed");
//! } else {
//!     println!("Too many requests");
//! }
//! ```
//!
//! # Components
//!
//! ## [Token Bucket](cores::TokenBucketCore)
//! A single budget, starting full, for global rate limiting:
//! ```rust
//! # use rate_guard_keyed::cores::TokenBucketCore;
//! # use std::time::Duration;
//! let limiter = TokenBucketCore::new(100, Duration::from_millis(10));
//! ```
//!
//! ## [Identity Registry](cores::IdentityRegistry)
//! One budget per caller identity, created on first sight from a single policy:
//! ```rust
//! # use rate_guard_keyed::cores::{EvictionPolicy, IdentityRegistry, TokenBucketCoreConfig};
//! # use std::num::NonZeroUsize;
//! # use std::time::Duration;
//! let registry = IdentityRegistry::new(
//!     TokenBucketCoreConfig::new(10, Duration::from_secs(6)),
//!     EvictionPolicy::max_identities(NonZeroUsize::new(50_000).unwrap()),
//! );
//! assert!(registry.allow_for_identity("10.0.0.7"));
//! ```
//!
//! # Core Concepts
//!
//! ## Time Representation
//! Buckets read a [`Clock`](clock::Clock) on every decision instead of running
//! a timer. [`SystemClock`](clock::SystemClock) is the default;
//! [`ManualClock`](clock::ManualClock) drives deterministic tests. The
//! `*_at(Instant)` methods accept a caller-supplied instant instead.
//!
//! ## Error Handling
//! Decisions are total: `allow*` returns `bool`. The `try_allow*` forms return
//! [`AllowResult`], whose [`RateLimited`] error carries how long to wait.
//! Invalid configuration is reported as [`ConfigError`] by the `try_*`
//! constructors and panics in the plain ones.
//!
//! ## Logging
//! Identity creation, eviction and denials are reported through the [`log`]
//! facade. No logger is installed by this crate.

pub mod clock;
pub mod cores;
pub mod error;
pub mod rate_limiter_core;
pub mod types;

pub use error::{AllowResult, ConfigError, RateLimited};
pub use rate_limiter_core::{KeyedRateLimiterCore, RateLimiterCore};
pub use types::Uint;

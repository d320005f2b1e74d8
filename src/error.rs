//! error.rs
//! Construction errors and the verbose denial returned by `try_allow*` calls.

use crate::types::Uint;
use std::time::Duration;
use thiserror::Error;

/// Rejected bucket or registry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A bucket must be able to hold at least one token.
    #[error("capacity must be greater than 0")]
    ZeroCapacity,
    /// A zero interval would credit an unbounded number of tokens per call.
    #[error("refill_interval must be greater than 0")]
    ZeroRefillInterval,
    /// An idle timeout of zero would evict every other identity on each insert.
    #[error("idle_timeout must be greater than 0")]
    ZeroIdleTimeout,
}

/// Denial with diagnostic information.
///
/// Only the verbose decision paths build this; the boolean `allow*` calls
/// discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited: {available} token(s) available, retry after {retry_after:?}")]
pub struct RateLimited {
    /// Tokens in the bucket at decision time (always 0 for single-token requests).
    pub available: Uint,
    /// Time left until the next whole refill interval completes.
    pub retry_after: Duration,
}

/// Result type for verbose decisions.
pub type AllowResult = Result<(), RateLimited>;

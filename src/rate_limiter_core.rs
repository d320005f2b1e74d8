//! Core traits for rate limiter decisions.
//!
//! [`RateLimiterCore`] covers a single shared budget, [`KeyedRateLimiterCore`]
//! covers budgets looked up by caller identity.

pub use crate::types::Uint;
use crate::AllowResult;

/// A single rate-limited budget.
pub trait RateLimiterCore: Send + Sync {
    /// Attempts to consume one token now, returning diagnostics on denial.
    fn try_allow(&self) -> AllowResult;

    /// Consumes one token now if available.
    ///
    /// # Returns
    /// `true` if the action may proceed, `false` if it must be rejected.
    #[inline(always)]
    fn allow(&self) -> bool {
        self.try_allow().is_ok()
    }

    /// Returns the number of tokens available now, after crediting elapsed time.
    fn tokens_available(&self) -> Uint;
}

/// Budgets keyed by caller identity.
pub trait KeyedRateLimiterCore: Send + Sync {
    /// Attempts to consume one token from `identity`'s budget, returning
    /// diagnostics on denial.
    fn try_allow_for_identity(&self, identity: &str) -> AllowResult;

    /// Consumes one token from `identity`'s budget if available.
    #[inline(always)]
    fn allow_for_identity(&self, identity: &str) -> bool {
        self.try_allow_for_identity(identity).is_ok()
    }
}

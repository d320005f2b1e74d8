//! Token bucket cores and the per-identity registry built on them.
//!
//! - **[`TokenBucketCore`]** - One independently locked budget. Use a single
//!   shared instance for global rate limiting.
//! - **[`IdentityRegistry`]** - Lazily creates one `TokenBucketCore` per caller
//!   identity from a single policy, with an optional [`EvictionPolicy`] bounding
//!   how many identities are remembered.
//!
//! # Thread Safety
//!
//! Each bucket has its own lock held for one fused refill-and-consume step.
//! The registry has a separate lock covering only the identity map; it is
//! released before the identity's bucket is consulted.

pub mod token_bucket_core;
pub use token_bucket_core::TokenBucketCore;
pub use token_bucket_core::TokenBucketCoreConfig;

pub mod identity_registry;
pub use identity_registry::EvictionPolicy;
pub use identity_registry::IdentityRegistry;

//! # bazaar-cache
//!
//! Provider-side service deduplication for the Bazaar marketplace.
//!
//! A provider that accepts a request resolves it through a [`ServiceCache`]:
//! the request's [`Fingerprint`](bazaar_core::Fingerprint) selects a slot; a
//! live endpoint in that slot is reused, otherwise a new one is generated and
//! kept until its TTL elapses.
//!
//! - **Dedup** - at most one live endpoint per fingerprint
//! - **Serialization** - one generation in flight per fingerprint
//! - **Freshness** - optional payload regeneration on reuse ([`FreshnessPolicy`])
//! - **Sweep** - expired endpoints evicted without blocking negotiations
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use bazaar_cache::{CacheConfig, FreshnessPolicy, ServiceCache};
//!
//! let cache = ServiceCache::new(
//!     CacheConfig::default()
//!         .with_ttl(Duration::from_secs(300))
//!         .with_freshness(FreshnessPolicy::Never),
//! );
//! assert!(cache.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod endpoint;
pub mod error;
pub mod policy;

pub use cache::{CacheStats, Generator, ServiceCache, SweepReport};
pub use endpoint::{Resolution, ResolveOutcome, ServiceEndpoint};
pub use error::{CacheError, Result};
pub use policy::{CacheConfig, FreshnessPolicy, DEFAULT_GENERATE_TIMEOUT, DEFAULT_TTL};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

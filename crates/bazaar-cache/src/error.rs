//! Error types for bazaar-cache.

use bazaar_core::{AiError, Fingerprint};
use thiserror::Error;

/// Errors from resolving a request through the cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The payload generator failed or timed out for a new endpoint.
    #[error("failed to generate payload for {fingerprint}: {source}")]
    Generation {
        /// Dedup key of the request.
        fingerprint: Fingerprint,
        /// Underlying generator failure.
        #[source]
        source: AiError,
    },
}

impl CacheError {
    /// Returns the fingerprint the error applies to.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Generation { fingerprint, .. } => fingerprint,
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

//! Error types for the orchestrator.

use bazaar_agent::AgentError;
use bazaar_core::{Capability, MarketError, RequestId};
use thiserror::Error;

/// Errors from orchestrating a request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Selection was asked to choose from no candidates.
    #[error("no provider available for '{capability}'")]
    NoProviderAvailable {
        /// Requested capability.
        capability: Capability,
    },

    /// Every selected provider failed to fulfill.
    #[error("all {attempts} provider(s) failed for request {request_id}: {last}")]
    AllProvidersFailed {
        /// Request that went unfulfilled.
        request_id: RequestId,
        /// Number of negotiations attempted.
        attempts: usize,
        /// Failure of the last attempt.
        #[source]
        last: AgentError,
    },

    /// A market-level failure such as an empty discovery.
    #[error(transparent)]
    Market(#[from] MarketError),
}

impl OrchestratorError {
    /// Short reason code used in wire rejections.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoProviderAvailable { .. } => "no_provider_available",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::Market(err) => err.code(),
        }
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

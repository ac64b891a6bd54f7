//! Error types for bazaar-core.

use std::time::Duration;

use thiserror::Error;

use crate::capability::Capability;
use crate::types::RequestId;

/// Marketplace-level failure taxonomy.
///
/// Every variant is recoverable inside the component that detects it; none of
/// them should abort a running bot. Duplicate creation races are not listed
/// because the service cache serializes creation per fingerprint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    /// No candidate providers were found for a capability.
    #[error("no providers found for capability '{capability}'")]
    DiscoveryEmpty {
        /// The capability that was queried.
        capability: Capability,
    },

    /// A peer did not answer within the negotiation bound.
    #[error("negotiation {request_id} timed out during {stage}")]
    NegotiationTimeout {
        /// The request being negotiated.
        request_id: RequestId,
        /// Protocol stage that timed out (`offer`, `fulfillment`).
        stage: String,
    },

    /// The provider explicitly cannot fulfill the capability.
    #[error("capability '{capability}' is not offered by this provider")]
    CapabilityMismatch {
        /// The capability that was requested.
        capability: Capability,
    },

    /// The external AI capability failed or timed out.
    #[error("AI service unavailable: {0}")]
    AiServiceUnavailable(String),
}

impl MarketError {
    /// Short machine-readable code, used as the rejection reason on the wire.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DiscoveryEmpty { .. } => "discovery_empty",
            Self::NegotiationTimeout { .. } => "negotiation_timeout",
            Self::CapabilityMismatch { .. } => "capability_mismatch",
            Self::AiServiceUnavailable(_) => "ai_service_unavailable",
        }
    }
}

/// Errors from capability parsing and catalog checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Tag is empty or contains characters outside the allowed set.
    #[error("invalid capability tag: '{0}'")]
    Invalid(String),

    /// Tag is well-formed but not present in the allow-list.
    #[error("capability '{0}' is not in the catalog")]
    NotAllowed(String),
}

/// Errors from the external AI capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// The backend could not be reached or returned an error.
    #[error("AI backend unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its bound.
    #[error("AI call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with something that does not fit the contract.
    #[error("malformed AI output: {0}")]
    Malformed(String),
}

impl From<AiError> for MarketError {
    fn from(err: AiError) -> Self {
        Self::AiServiceUnavailable(err.to_string())
    }
}

/// Errors from moving a message between bots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing is listening at the endpoint.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The peer did not answer within the bound.
    #[error("no reply from {endpoint} within {}ms", .timeout.as_millis())]
    Timeout {
        /// Endpoint that was called.
        endpoint: String,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// Message could not be encoded or decoded as JSON.
    #[error("codec error: {0}")]
    Codec(String),
}

impl TransportError {
    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from talking to the mediator directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The mediator could not be reached in time.
    #[error("mediator unreachable: {0}")]
    Unreachable(String),

    /// The mediator refused the operation.
    #[error("mediator rejected request: {0}")]
    Rejected(String),

    /// The mediator answered with an unexpected message kind.
    #[error("unexpected reply from mediator: {0}")]
    UnexpectedReply(String),
}

impl From<TransportError> for DirectoryError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Codec(reason) => Self::UnexpectedReply(reason),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_error_codes_are_stable() {
        let cap = Capability::new("finance").unwrap();
        assert_eq!(
            MarketError::CapabilityMismatch { capability: cap.clone() }.code(),
            "capability_mismatch"
        );
        assert_eq!(MarketError::DiscoveryEmpty { capability: cap }.code(), "discovery_empty");
        assert_eq!(
            MarketError::AiServiceUnavailable("down".into()).code(),
            "ai_service_unavailable"
        );
    }

    #[test]
    fn ai_error_converts_to_unavailable() {
        let err: MarketError = AiError::Timeout(Duration::from_millis(250)).into();
        assert!(matches!(err, MarketError::AiServiceUnavailable(ref m) if m.contains("250ms")));
    }

    #[test]
    fn transport_timeout_maps_to_unreachable_directory() {
        let err = TransportError::Timeout {
            endpoint: "local://mediator".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert!(matches!(DirectoryError::from(err), DirectoryError::Unreachable(_)));
    }

    #[test]
    fn codec_error_maps_to_unexpected_reply() {
        let err = DirectoryError::from(TransportError::Codec("bad json".into()));
        assert_eq!(err, DirectoryError::UnexpectedReply("bad json".into()));
    }
}

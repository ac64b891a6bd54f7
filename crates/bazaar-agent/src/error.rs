//! Error types for bazaar-agent.

use bazaar_core::{BotId, DirectoryError, MarketError, RequestId, TransportError};
use thiserror::Error;

use crate::state::NegotiationState;

/// Errors from the negotiation state machine and table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The requested move is not allowed from the current state.
    #[error("invalid negotiation transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: NegotiationState,
        /// Requested state.
        to: NegotiationState,
    },

    /// No record exists for the negotiation.
    #[error("no negotiation for request {request_id} with {provider_id}")]
    UnknownNegotiation {
        /// Request ID.
        request_id: RequestId,
        /// Provider side of the negotiation.
        provider_id: BotId,
    },

    /// A record already exists for the negotiation.
    #[error("negotiation for request {request_id} with {provider_id} already exists")]
    AlreadyExists {
        /// Request ID.
        request_id: RequestId,
        /// Provider side of the negotiation.
        provider_id: BotId,
    },
}

/// Errors that can occur in agent operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    /// Marketplace-level failure (discovery empty, timeout, mismatch, AI outage).
    #[error(transparent)]
    Market(#[from] MarketError),

    /// The provider declined the request or the fulfillment.
    #[error("provider {provider_id} rejected request: {reason}")]
    Rejected {
        /// Provider that rejected.
        provider_id: BotId,
        /// Reason given.
        reason: String,
    },

    /// The negotiation was abandoned or swept while in flight.
    #[error("negotiation for request {0} was abandoned")]
    Abandoned(RequestId),

    /// State machine violation.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// The peer could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The mediator could not be reached or refused.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The peer answered with a message that does not fit the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

//! Wire messages exchanged between bots.
//!
//! Every message is a JSON object carrying a `"type"` discriminator. The same
//! enum is used for mediator traffic (register, discover, log) and for the
//! request/offer/decision/fulfillment negotiation exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capability;
use crate::types::{BotDescriptor, BotId, NegotiationEvent, RequestId, ServiceId, ServiceListing, ServiceRequest};

/// A message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Register or re-register a bot with the mediator.
    Register {
        /// Descriptor to store.
        descriptor: BotDescriptor,
    },
    /// Mediator reply to [`Message::Register`].
    Registered(RegistrationAck),
    /// Ask the mediator for providers of a capability.
    Discover(DiscoveryQuery),
    /// Mediator reply to [`Message::Discover`].
    Discovered {
        /// Matching bots in registration order.
        bots: Vec<BotDescriptor>,
    },
    /// Remove a bot from the mediator.
    Deregister {
        /// Bot to remove.
        bot_id: BotId,
    },
    /// Mediator reply to [`Message::Deregister`].
    Deregistered(DeregistrationAck),
    /// Append a negotiation outcome to the mediator log.
    LogEvent {
        /// Event to append.
        event: NegotiationEvent,
    },
    /// Announce a service endpoint to the mediator.
    AnnounceService {
        /// Listing to store.
        listing: ServiceListing,
    },
    /// Generic acknowledgement.
    Ack,
    /// A service request sent to a provider or orchestrator.
    Request(ServiceRequest),
    /// Provider offer in reply to a request.
    Offer(OfferMessage),
    /// Accept or reject; also used by providers to decline a request.
    Decision(DecisionMessage),
    /// Provider response carrying the service payload.
    Fulfillment(FulfillmentMessage),
    /// The peer could not process the message.
    Error {
        /// Human-readable reason.
        reason: String,
    },
}

impl Message {
    /// Short name of the variant, matching the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Registered(_) => "registered",
            Self::Discover(_) => "discover",
            Self::Discovered { .. } => "discovered",
            Self::Deregister { .. } => "deregister",
            Self::Deregistered(_) => "deregistered",
            Self::LogEvent { .. } => "log_event",
            Self::AnnounceService { .. } => "announce_service",
            Self::Ack => "ack",
            Self::Request(_) => "request",
            Self::Offer(_) => "offer",
            Self::Decision(_) => "decision",
            Self::Fulfillment(_) => "fulfillment",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error { reason: reason.into() }
    }

    /// Request ID carried by negotiation messages.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Request(r) => Some(r.request_id()),
            Self::Offer(o) => Some(o.request_id),
            Self::Decision(d) => Some(d.request_id),
            Self::Fulfillment(f) => Some(f.request_id),
            Self::LogEvent { event } => Some(event.request_id),
            _ => None,
        }
    }
}

/// Mediator acknowledgement of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAck {
    /// Registered bot.
    pub bot_id: BotId,
    /// True if an existing descriptor was replaced.
    pub overwritten: bool,
}

/// Mediator acknowledgement of a deregistration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregistrationAck {
    /// Bot that was asked to be removed.
    pub bot_id: BotId,
    /// False if the bot was not registered.
    pub removed: bool,
}

/// Discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    /// Capability tag to match exactly.
    pub capability: Capability,
    /// Bots to leave out of the result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<BotId>,
}

impl DiscoveryQuery {
    /// Creates a query without exclusions.
    #[must_use]
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            exclude: Vec::new(),
        }
    }

    /// Excludes a bot from the result.
    #[must_use]
    pub fn excluding(mut self, bot_id: BotId) -> Self {
        if !self.exclude.contains(&bot_id) {
            self.exclude.push(bot_id);
        }
        self
    }
}

/// How soon a provider expects to produce the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// A live endpoint exists; fulfillment is a cache hit.
    Immediate,
    /// The payload must be generated after acceptance.
    OnDemand,
}

/// Terms a provider attaches to an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferTerms {
    /// Provider self-assessed confidence in `[0, 1]`.
    pub confidence: f64,
    /// Lifetime of a newly created endpoint, in seconds.
    pub ttl_secs: u64,
    /// True if a live endpoint for this fingerprint already exists.
    pub cached: bool,
    /// Estimated readiness.
    pub readiness: Readiness,
}

/// Provider offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferMessage {
    /// Request being offered on.
    pub request_id: RequestId,
    /// Offering provider.
    pub provider_id: BotId,
    /// Offer terms.
    pub terms: OfferTerms,
}

/// Accept or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Proceed to fulfillment.
    Accepted,
    /// Stop the negotiation.
    Rejected,
}

/// A decision on a request or offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMessage {
    /// Request being decided.
    pub request_id: RequestId,
    /// The decision.
    pub decision: Decision,
    /// Reason for a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DecisionMessage {
    /// Builds an acceptance.
    #[must_use]
    pub const fn accept(request_id: RequestId) -> Self {
        Self {
            request_id,
            decision: Decision::Accepted,
            reason: None,
        }
    }

    /// Builds a rejection with a reason.
    #[must_use]
    pub fn reject(request_id: RequestId, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            decision: Decision::Rejected,
            reason: Some(reason.into()),
        }
    }

    /// Returns true for an acceptance.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self.decision, Decision::Accepted)
    }
}

/// Fulfillment of an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentMessage {
    /// Request being fulfilled.
    pub request_id: RequestId,
    /// Endpoint that produced the payload.
    pub service_id: ServiceId,
    /// Service payload.
    pub payload: Value,
    /// When the endpoint expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// True if served from an existing endpoint.
    #[serde(default)]
    pub reused: bool,
    /// Provider that produced it, set when relayed by an orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<BotId>,
    /// Ranking score, set when relayed by an orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

//! Negotiation state machine.
//!
//! One negotiation covers one request between one requestor and one
//! provider:
//!
//! ```text
//! Created ──▶ Offered ──▶ Accepted ──▶ Fulfilled
//!    │           │            │
//!    └───────────┴────────────┴──▶ Rejected
//!    (any non-terminal) ──────────▶ Expired
//! ```
//!
//! `Accepted ──▶ Rejected` covers a provider that fails to produce the
//! payload after acceptance. Every move is forward-only; no state is
//! revisited.

use std::fmt;

use bazaar_core::{BotId, FulfillmentMessage, OfferTerms, Outcome, RequestId, ServiceRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

/// State of one negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    /// Request received or sent, no offer yet.
    Created,
    /// Provider offered terms.
    Offered,
    /// Requestor accepted the offer.
    Accepted,
    /// Payload delivered.
    Fulfilled,
    /// One side declined.
    Rejected,
    /// Timed out or abandoned.
    Expired,
}

impl NegotiationState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Offered,
        Self::Accepted,
        Self::Fulfilled,
        Self::Rejected,
        Self::Expired,
    ];

    /// Returns true for `Fulfilled`, `Rejected`, and `Expired`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Rejected | Self::Expired)
    }

    /// Returns true if moving to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Offered)
                | (Self::Offered, Self::Accepted)
                | (Self::Accepted, Self::Fulfilled)
                | (Self::Created | Self::Offered | Self::Accepted, Self::Rejected)
                | (Self::Created | Self::Offered | Self::Accepted, Self::Expired)
        )
    }

    /// Outcome reported for a terminal state.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Fulfilled => Some(Outcome::Fulfilled),
            Self::Rejected => Some(Outcome::Rejected),
            Self::Expired => Some(Outcome::Expired),
            Self::Created | Self::Offered | Self::Accepted => None,
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Offered => write!(f, "offered"),
            Self::Accepted => write!(f, "accepted"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// One entry in a record's transition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State entered.
    pub state: NegotiationState,
    /// When it was entered.
    pub at: DateTime<Utc>,
}

/// Full history of one negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    /// The request under negotiation.
    pub request: ServiceRequest,
    /// Provider side of the negotiation.
    pub provider_id: BotId,
    /// Terms offered, once `Offered`.
    pub offer: Option<OfferTerms>,
    /// Delivered response, once `Fulfilled`.
    pub response: Option<FulfillmentMessage>,
    /// Reason recorded on `Rejected` or `Expired`.
    pub rejection: Option<String>,
    state: NegotiationState,
    transitions: Vec<Transition>,
}

impl NegotiationRecord {
    /// Creates a record in `Created` at the current time.
    #[must_use]
    pub fn new(request: ServiceRequest, provider_id: BotId) -> Self {
        Self::new_at(request, provider_id, Utc::now())
    }

    /// Creates a record in `Created` at `now`.
    #[must_use]
    pub fn new_at(request: ServiceRequest, provider_id: BotId, now: DateTime<Utc>) -> Self {
        Self {
            request,
            provider_id,
            offer: None,
            response: None,
            rejection: None,
            state: NegotiationState::Created,
            transitions: vec![Transition {
                state: NegotiationState::Created,
                at: now,
            }],
        }
    }

    /// Request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request.request_id()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> NegotiationState {
        self.state
    }

    /// Transition history, oldest first, starting with `Created`.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// When the record was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.transitions.first().map_or_else(Utc::now, |t| t.at)
    }

    /// When the record last changed state.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.transitions.last().map_or_else(Utc::now, |t| t.at)
    }

    /// Returns true once the record is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves to `next` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::InvalidTransition`] and leaves the record
    /// untouched if the move is not allowed.
    pub fn transition_at(&mut self, next: NegotiationState, now: DateTime<Utc>) -> Result<(), NegotiationError> {
        if !self.state.can_transition_to(next) {
            return Err(NegotiationError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.transitions.push(Transition { state: next, at: now });
        Ok(())
    }

    /// Moves to `next` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::InvalidTransition`] if the move is not allowed.
    pub fn transition(&mut self, next: NegotiationState) -> Result<(), NegotiationError> {
        self.transition_at(next, Utc::now())
    }

    /// Records the offer and moves to `Offered`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `Created`.
    pub fn offer_at(&mut self, terms: OfferTerms, now: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition_at(NegotiationState::Offered, now)?;
        self.offer = Some(terms);
        Ok(())
    }

    /// Records the response and moves to `Fulfilled`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `Accepted`.
    pub fn fulfill_at(&mut self, response: FulfillmentMessage, now: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition_at(NegotiationState::Fulfilled, now)?;
        self.response = Some(response);
        Ok(())
    }

    /// Records a reason and moves to `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal.
    pub fn reject_at(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition_at(NegotiationState::Rejected, now)?;
        self.rejection = Some(reason.into());
        Ok(())
    }

    /// Records a reason and moves to `Expired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal.
    pub fn expire_at(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition_at(NegotiationState::Expired, now)?;
        self.rejection = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests;

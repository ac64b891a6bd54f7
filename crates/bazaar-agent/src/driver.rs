//! Requestor side of the negotiation protocol.
//!
//! The driver runs one single-round negotiation against one provider
//! endpoint: send the request, accept the offer, wait for the fulfillment.
//! Every wait is bounded; every terminal state is reported to the directory
//! without blocking the caller.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{
    send_with_timeout, BotDescriptor, BotId, DecisionMessage, FulfillmentMessage, MarketError, Message,
    NegotiationEvent, OfferTerms, Outcome, RequestId, ServiceRequest, Transport, TransportError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, NegotiationError, Result};
use crate::reporter::{EventReporter, DEFAULT_REPORT_TIMEOUT};
use crate::state::{NegotiationRecord, NegotiationState};
use crate::table::{NegotiationTable, TableSweep};

/// Bounds on each negotiation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationTimeouts {
    /// Wait for an offer after sending the request.
    pub offer: Duration,
    /// Wait for the fulfillment after accepting.
    pub fulfillment: Duration,
    /// Bound on outcome reports.
    pub report: Duration,
    /// Wait for an offer from an orchestrator, which runs its whole
    /// pipeline (including its own provider negotiations) before replying.
    pub proxy_offer: Duration,
}

impl Default for NegotiationTimeouts {
    fn default() -> Self {
        Self {
            offer: Duration::from_secs(5),
            fulfillment: Duration::from_secs(30),
            report: DEFAULT_REPORT_TIMEOUT,
            proxy_offer: Duration::from_secs(120),
        }
    }
}

impl NegotiationTimeouts {
    /// Longest a negotiation driven by these bounds can stay open.
    #[must_use]
    pub fn longest_negotiation(&self) -> Duration {
        self.offer.max(self.proxy_offer) + self.fulfillment
    }
}

/// A completed negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    /// Provider that fulfilled the request.
    pub provider_id: BotId,
    /// Terms the provider offered.
    pub terms: OfferTerms,
    /// The delivered response.
    pub fulfillment: FulfillmentMessage,
    /// When the fulfillment arrived.
    pub completed_at: DateTime<Utc>,
}

/// Runs negotiations on behalf of one bot.
pub struct NegotiationDriver {
    bot_id: BotId,
    transport: Arc<dyn Transport>,
    table: Arc<NegotiationTable>,
    reporter: EventReporter,
    timeouts: NegotiationTimeouts,
}

impl std::fmt::Debug for NegotiationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationDriver")
            .field("bot_id", &self.bot_id)
            .field("records", &self.table.len())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl NegotiationDriver {
    /// Creates a driver with its own negotiation table.
    #[must_use]
    pub fn new(
        bot_id: BotId,
        transport: Arc<dyn Transport>,
        reporter: EventReporter,
        timeouts: NegotiationTimeouts,
    ) -> Self {
        Self {
            bot_id,
            transport,
            table: Arc::new(NegotiationTable::new()),
            reporter,
            timeouts,
        }
    }

    /// Bot the driver negotiates for.
    #[must_use]
    pub const fn bot_id(&self) -> &BotId {
        &self.bot_id
    }

    /// Negotiation records kept by this driver.
    #[must_use]
    pub const fn table(&self) -> &Arc<NegotiationTable> {
        &self.table
    }

    /// Stage bounds.
    #[must_use]
    pub const fn timeouts(&self) -> NegotiationTimeouts {
        self.timeouts
    }

    /// Negotiates `request` with `provider` until it is fulfilled, rejected,
    /// or expired.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Rejected`] if the provider declined.
    /// - [`AgentError::Market`] with `NegotiationTimeout` if a stage timed out.
    /// - [`AgentError::Transport`] if the provider could not be reached.
    /// - [`AgentError::Abandoned`] if the negotiation was abandoned meanwhile.
    pub async fn negotiate(&self, provider: &BotDescriptor, request: &ServiceRequest) -> Result<Deal> {
        self.run(provider, request, self.timeouts.offer).await
    }

    /// Negotiates `request` through an orchestrator endpoint.
    ///
    /// Same contract as [`NegotiationDriver::negotiate`], except the offer
    /// stage waits up to [`NegotiationTimeouts::proxy_offer`].
    ///
    /// # Errors
    ///
    /// Same as [`NegotiationDriver::negotiate`].
    pub async fn negotiate_via(&self, orchestrator: &BotDescriptor, request: &ServiceRequest) -> Result<Deal> {
        self.run(orchestrator, request, self.timeouts.proxy_offer).await
    }

    /// Drops closed records older than `grace` and expires open ones that
    /// outlived [`NegotiationTimeouts::longest_negotiation`], which only
    /// happens when a negotiating future was dropped.
    pub fn sweep(&self, now: DateTime<Utc>, grace: Duration) -> TableSweep {
        self.table.sweep(now, grace, self.timeouts.longest_negotiation())
    }

    async fn run(&self, provider: &BotDescriptor, request: &ServiceRequest, offer_timeout: Duration) -> Result<Deal> {
        let request_id = request.request_id();
        let provider_id = &provider.bot_id;
        self.table
            .insert(NegotiationRecord::new(request.clone(), provider_id.clone()))?;
        debug!(request_id = %request_id, provider = %provider_id, "Sending request");

        let reply = send_with_timeout(
            self.transport.as_ref(),
            &provider.endpoint,
            Message::Request(request.clone()),
            offer_timeout,
        )
        .await;

        let terms = match reply {
            Ok(Message::Offer(offer)) if offer.request_id == request_id => {
                let terms = offer.terms;
                self.step(request_id, provider_id, |r| r.offer_at(terms.clone(), Utc::now()))?;
                terms
            }
            Ok(reply) => return Err(self.close_on_reply(request_id, provider_id, reply)),
            Err(err) => return Err(self.close_on_transport(request_id, provider_id, "offer", err)),
        };

        self.step(request_id, provider_id, |r| r.transition_at(NegotiationState::Accepted, Utc::now()))?;
        debug!(request_id = %request_id, provider = %provider_id, confidence = terms.confidence, "Accepted offer");

        let reply = send_with_timeout(
            self.transport.as_ref(),
            &provider.endpoint,
            Message::Decision(DecisionMessage::accept(request_id)),
            self.timeouts.fulfillment,
        )
        .await;

        match reply {
            Ok(Message::Fulfillment(fulfillment)) if fulfillment.request_id == request_id => {
                let completed_at = Utc::now();
                self.step(request_id, provider_id, |r| r.fulfill_at(fulfillment.clone(), completed_at))?;
                info!(
                    request_id = %request_id,
                    provider = %provider_id,
                    service_id = %fulfillment.service_id,
                    reused = fulfillment.reused,
                    "Negotiation fulfilled"
                );
                self.report(request_id, provider_id, Outcome::Fulfilled, None);
                Ok(Deal {
                    provider_id: provider_id.clone(),
                    terms,
                    fulfillment,
                    completed_at,
                })
            }
            Ok(reply) => Err(self.close_on_reply(request_id, provider_id, reply)),
            Err(err) => Err(self.close_on_transport(request_id, provider_id, "fulfillment", err)),
        }
    }

    /// Expires every open negotiation for `request_id`. Returns how many.
    pub fn abandon(&self, request_id: RequestId) -> usize {
        let now = Utc::now();
        let mut abandoned = 0;
        for record in self.table.for_request(request_id) {
            if record.is_terminal() {
                continue;
            }
            let result = self
                .table
                .update(request_id, &record.provider_id, |r| r.expire_at("abandoned", now));
            if result.is_ok() {
                abandoned += 1;
                info!(request_id = %request_id, provider = %record.provider_id, "Abandoned negotiation");
                self.report(request_id, &record.provider_id, Outcome::Expired, Some("abandoned".into()));
            }
        }
        abandoned
    }

    fn step(
        &self,
        request_id: RequestId,
        provider_id: &BotId,
        f: impl FnOnce(&mut NegotiationRecord) -> std::result::Result<(), NegotiationError>,
    ) -> Result<()> {
        self.table.update(request_id, provider_id, f).map_err(|err| match err {
            NegotiationError::InvalidTransition { .. } | NegotiationError::UnknownNegotiation { .. } => {
                debug!(request_id = %request_id, provider = %provider_id, error = %err, "Negotiation closed elsewhere");
                AgentError::Abandoned(request_id)
            }
            other => AgentError::Negotiation(other),
        })
    }

    fn close_on_reply(&self, request_id: RequestId, provider_id: &BotId, reply: Message) -> AgentError {
        let (reason, error) = match reply {
            Message::Decision(decision) if !decision.is_accepted() => {
                let reason = decision.reason.unwrap_or_else(|| "rejected".into());
                (reason.clone(), AgentError::Rejected {
                    provider_id: provider_id.clone(),
                    reason,
                })
            }
            Message::Error { reason } => (reason.clone(), AgentError::Rejected {
                provider_id: provider_id.clone(),
                reason,
            }),
            other => {
                let reason = format!("unexpected '{}' reply", other.kind());
                (reason.clone(), AgentError::Protocol(reason))
            }
        };

        if let Err(err) = self.step(request_id, provider_id, |r| r.reject_at(reason.clone(), Utc::now())) {
            return err;
        }
        debug!(request_id = %request_id, provider = %provider_id, reason = %reason, "Negotiation rejected");
        self.report(request_id, provider_id, Outcome::Rejected, Some(reason));
        error
    }

    fn close_on_transport(
        &self,
        request_id: RequestId,
        provider_id: &BotId,
        stage: &str,
        err: TransportError,
    ) -> AgentError {
        let reason = format!("{stage}: {err}");
        if let Err(closed) = self.step(request_id, provider_id, |r| r.expire_at(reason.clone(), Utc::now())) {
            return closed;
        }
        warn!(request_id = %request_id, provider = %provider_id, stage, error = %err, "Negotiation expired");
        self.report(request_id, provider_id, Outcome::Expired, Some(reason));

        if err.is_timeout() {
            AgentError::Market(MarketError::NegotiationTimeout {
                request_id,
                stage: stage.to_string(),
            })
        } else {
            AgentError::Transport(err)
        }
    }

    fn report(&self, request_id: RequestId, provider_id: &BotId, outcome: Outcome, detail: Option<String>) {
        let mut event = NegotiationEvent::new(request_id, provider_id.clone(), outcome);
        event.detail = detail;
        self.reporter.report(event);
    }
}

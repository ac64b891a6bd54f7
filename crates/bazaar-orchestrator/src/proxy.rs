//! Transparent proxy mode.
//!
//! A requestor talks to the orchestrator exactly as it would to a provider:
//! the orchestrator answers a `Request` with an offer on behalf of the
//! best-ranked response and delivers that response on acceptance.

use std::collections::HashMap;
use std::time::Duration;

use bazaar_agent::{Registrable, REASON_UNKNOWN_REQUEST};
use bazaar_core::{
    BoxFuture, DecisionMessage, FulfillmentMessage, Message, MessageHandler, OfferMessage, OfferTerms, Readiness,
    RequestId, ServiceRequest,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::orchestrator::Orchestrator;
use crate::ranker::RankedResponse;

/// Best responses held until the requestor decides.
#[derive(Debug, Default)]
pub(crate) struct PendingResults {
    results: RwLock<HashMap<RequestId, (RankedResponse, DateTime<Utc>)>>,
}

impl PendingResults {
    pub(crate) fn insert(&self, request_id: RequestId, best: RankedResponse, expires_at: DateTime<Utc>) {
        self.results.write().insert(request_id, (best, expires_at));
    }

    /// Removes a held result, ignoring it if it expired before `now`.
    pub(crate) fn take_live(&self, request_id: RequestId, now: DateTime<Utc>) -> Option<RankedResponse> {
        self.take(request_id)
            .filter(|(_, expires_at)| now <= *expires_at)
            .map(|(best, _)| best)
    }

    pub(crate) fn take(&self, request_id: RequestId) -> Option<(RankedResponse, DateTime<Utc>)> {
        self.results.write().remove(&request_id)
    }

    pub(crate) fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut results = self.results.write();
        let before = results.len();
        results.retain(|_, (_, expires_at)| now <= *expires_at);
        before - results.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.results.read().len()
    }

    pub(crate) fn clear(&self) {
        self.results.write().clear();
    }
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Orchestrator {
    async fn proxy_request(&self, request: ServiceRequest) -> Message {
        let request_id = request.request_id();
        let response = match Orchestrator::handle(self, &request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(request_id = %request_id, error = %err, "Proxied request failed");
                return Message::Decision(DecisionMessage::reject(request_id, err.code()));
            }
        };
        let Some(best) = response.best().cloned() else {
            return Message::Decision(DecisionMessage::reject(request_id, "all_providers_failed"));
        };

        let terms = OfferTerms {
            confidence: best.deal.terms.confidence,
            ttl_secs: best.deal.terms.ttl_secs,
            cached: true,
            readiness: Readiness::Immediate,
        };
        let provider_id = best.provider_id().clone();
        let expires_at = deadline(Utc::now(), self.config().pending_ttl);
        self.pending.insert(request_id, best, expires_at);
        debug!(request_id = %request_id, provider = %provider_id, "Holding proxied result");

        Message::Offer(OfferMessage {
            request_id,
            provider_id,
            terms,
        })
    }

    fn proxy_decision(&self, decision: &DecisionMessage) -> Message {
        let request_id = decision.request_id;
        if !decision.is_accepted() {
            self.pending.take(request_id);
            debug!(request_id = %request_id, "Requestor declined proxied result");
            return Message::Ack;
        }

        let Some(best) = self.pending.take_live(request_id, Utc::now()) else {
            debug!(request_id = %request_id, "Acceptance for unknown or expired proxied result");
            return Message::Decision(DecisionMessage::reject(request_id, REASON_UNKNOWN_REQUEST));
        };

        info!(
            request_id = %request_id,
            orchestrator = %self.descriptor().bot_id,
            provider = %best.provider_id(),
            score = best.score,
            "Delivering proxied result"
        );
        Message::Fulfillment(FulfillmentMessage {
            request_id,
            provider_id: Some(best.provider_id().clone()),
            quality_score: Some(best.score),
            ..best.deal.fulfillment
        })
    }
}

impl MessageHandler for Orchestrator {
    fn handle(&self, message: Message) -> BoxFuture<'_, Message> {
        match message {
            Message::Request(request) => Box::pin(self.proxy_request(request)),
            Message::Decision(decision) => {
                let reply = self.proxy_decision(&decision);
                Box::pin(async move { reply })
            }
            other => {
                let kind = other.kind();
                Box::pin(async move { Message::error(format!("orchestrator does not handle '{kind}' messages")) })
            }
        }
    }
}

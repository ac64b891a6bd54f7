//! Provider bot.
//!
//! A provider evaluates incoming requests with the AI service, offers terms
//! when it can serve them, and resolves accepted requests through its
//! service cache so identical requests share one endpoint.

use std::sync::Arc;
use std::time::Duration;

use bazaar_cache::{ServiceCache, SweepReport};
use bazaar_core::{
    call_with_timeout, AiService, BotDescriptor, BoxFuture, DecisionMessage, Fingerprint, FulfillmentMessage,
    MarketError, Message, MessageHandler, OfferMessage, OfferTerms, Readiness, RequestId, ServiceRequest,
    spawn_periodic,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reporter::EventReporter;
use crate::state::{NegotiationRecord, NegotiationState};
use crate::table::NegotiationTable;
use crate::traits::{Negotiable, Registrable};

/// Rejection reason when the AI evaluation is below the confidence floor.
pub const REASON_LOW_CONFIDENCE: &str = "insufficient_confidence";
/// Rejection reason for a decision on an unknown or swept negotiation.
pub const REASON_UNKNOWN_REQUEST: &str = "unknown_request";
/// Rejection reason when the payload could not be produced after acceptance.
pub const REASON_GENERATION_FAILED: &str = "generation_failed";

/// Provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Minimum AI confidence required to offer.
    pub min_confidence: f64,
    /// Bound on the AI evaluation call.
    pub evaluate_timeout: Duration,
    /// Open negotiations older than this are expired by maintenance.
    pub negotiation_deadline: Duration,
    /// Closed negotiations are kept this long before being dropped.
    pub negotiation_grace: Duration,
    /// Period of the maintenance task.
    pub sweep_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            evaluate_timeout: Duration::from_secs(5),
            negotiation_deadline: Duration::from_secs(120),
            negotiation_grace: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Cache sweep result.
    pub cache: SweepReport,
    /// Negotiations expired as abandoned.
    pub expired_negotiations: usize,
    /// Closed negotiations dropped.
    pub dropped_negotiations: usize,
}

/// A bot that fulfills service requests.
pub struct ProviderBot {
    descriptor: BotDescriptor,
    ai: Arc<dyn AiService>,
    cache: Arc<ServiceCache>,
    table: NegotiationTable,
    reporter: EventReporter,
    config: ProviderConfig,
}

impl ProviderBot {
    /// Creates a provider.
    #[must_use]
    pub fn new(
        descriptor: BotDescriptor,
        ai: Arc<dyn AiService>,
        cache: Arc<ServiceCache>,
        reporter: EventReporter,
        config: ProviderConfig,
    ) -> Self {
        Self {
            descriptor,
            ai,
            cache,
            table: NegotiationTable::new(),
            reporter,
            config,
        }
    }

    /// The provider's service cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ServiceCache> {
        &self.cache
    }

    /// The provider's negotiation records.
    #[must_use]
    pub const fn negotiations(&self) -> &NegotiationTable {
        &self.table
    }

    /// Provider settings.
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Looks up this provider's record for a request.
    #[must_use]
    pub fn negotiation(&self, request_id: RequestId) -> Option<NegotiationRecord> {
        self.table.get(request_id, &self.descriptor.bot_id)
    }

    /// Sweeps the cache and the negotiation table once.
    pub fn maintain(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let cache = self.cache.sweep(now);
        let table = self
            .table
            .sweep(now, self.config.negotiation_grace, self.config.negotiation_deadline);
        let report = MaintenanceReport {
            cache,
            expired_negotiations: table.expired.len(),
            dropped_negotiations: table.dropped,
        };
        debug!(provider = %self.descriptor.bot_id, ?report, "Provider maintenance");
        report
    }

    /// Runs [`ProviderBot::maintain`] every `sweep_interval` until `shutdown`
    /// turns true or its sender is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let bot = Arc::clone(self);
        spawn_periodic(
            format!("provider {}", self.descriptor.bot_id),
            self.config.sweep_interval,
            shutdown,
            move || {
                bot.maintain(Utc::now());
            },
        )
    }

    /// Drops cached endpoints and negotiation records. Intended for shutdown.
    pub fn clear(&self) {
        self.cache.clear();
        self.table.clear();
    }

    fn decline(&self, request_id: RequestId, reason: &str) -> Message {
        let me = &self.descriptor.bot_id;
        if let Err(err) = self.table.update(request_id, me, |r| r.reject_at(reason, Utc::now())) {
            debug!(request_id = %request_id, error = %err, "Could not record rejection");
        }
        debug!(request_id = %request_id, provider = %me, reason, "Declined request");
        Message::Decision(DecisionMessage::reject(request_id, reason))
    }

    async fn answer_request(&self, request: ServiceRequest) -> Message {
        let request_id = request.request_id();
        let me = &self.descriptor.bot_id;

        if let Err(err) = self.table.insert(NegotiationRecord::new(request.clone(), me.clone())) {
            warn!(request_id = %request_id, error = %err, "Duplicate request");
            return Message::Decision(DecisionMessage::reject(request_id, "duplicate_request"));
        }

        let capability = request.capability();
        if !self.descriptor.has_capability(capability) {
            let err = MarketError::CapabilityMismatch {
                capability: capability.clone(),
            };
            return self.decline(request_id, err.code());
        }

        let evaluation = call_with_timeout(
            self.config.evaluate_timeout,
            self.ai.evaluate(capability, request.effective_parameters()),
        )
        .await;
        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!(request_id = %request_id, provider = %me, error = %err, "Evaluation failed, declining");
                return self.decline(request_id, MarketError::from(err).code());
            }
        };
        if !evaluation.passes(self.config.min_confidence) {
            return self.decline(request_id, REASON_LOW_CONFIDENCE);
        }

        let cached = self
            .cache
            .peek(&Fingerprint::of_request(&request), Utc::now())
            .is_some();
        let terms = OfferTerms {
            confidence: evaluation.confidence,
            ttl_secs: self.cache.ttl().as_secs(),
            cached,
            readiness: if cached { Readiness::Immediate } else { Readiness::OnDemand },
        };

        match self.table.update(request_id, me, |r| r.offer_at(terms.clone(), Utc::now())) {
            Ok(()) => {
                debug!(request_id = %request_id, provider = %me, confidence = terms.confidence, cached, "Offered");
                Message::Offer(OfferMessage {
                    request_id,
                    provider_id: me.clone(),
                    terms,
                })
            }
            Err(err) => {
                debug!(request_id = %request_id, error = %err, "Negotiation closed before offer");
                Message::Decision(DecisionMessage::reject(request_id, REASON_UNKNOWN_REQUEST))
            }
        }
    }

    async fn answer_decision(&self, decision: DecisionMessage) -> Message {
        let request_id = decision.request_id;
        let me = &self.descriptor.bot_id;

        let Some(record) = self.table.get(request_id, me) else {
            debug!(request_id = %request_id, "Decision for unknown negotiation");
            return Message::Decision(DecisionMessage::reject(request_id, REASON_UNKNOWN_REQUEST));
        };

        if !decision.is_accepted() {
            let reason = decision.reason.unwrap_or_else(|| "declined by requestor".into());
            if let Err(err) = self.table.update(request_id, me, |r| r.reject_at(reason, Utc::now())) {
                debug!(request_id = %request_id, error = %err, "Rejection for closed negotiation");
            }
            return Message::Ack;
        }

        if let Err(err) = self
            .table
            .transition_at(request_id, me, NegotiationState::Accepted, Utc::now())
        {
            debug!(request_id = %request_id, error = %err, "Acceptance in wrong state");
            return Message::Decision(DecisionMessage::reject(request_id, REASON_UNKNOWN_REQUEST));
        }

        let resolution = match self.cache.resolve(&record.request, &self.ai).await {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(request_id = %request_id, provider = %me, error = %err, "Fulfillment failed");
                return self.decline(request_id, REASON_GENERATION_FAILED);
            }
        };

        let fulfillment = FulfillmentMessage {
            request_id,
            service_id: resolution.endpoint.service_id,
            payload: resolution.endpoint.payload.clone(),
            expires_at: Some(resolution.endpoint.expires_at),
            reused: resolution.reused(),
            provider_id: None,
            quality_score: None,
        };

        if let Err(err) = self
            .table
            .update(request_id, me, |r| r.fulfill_at(fulfillment.clone(), Utc::now()))
        {
            debug!(request_id = %request_id, error = %err, "Negotiation closed during fulfillment");
            return Message::Decision(DecisionMessage::reject(request_id, REASON_UNKNOWN_REQUEST));
        }

        if !resolution.reused() {
            self.reporter.announce(resolution.endpoint.listing(me.clone()));
        }
        info!(
            request_id = %request_id,
            provider = %me,
            service_id = %fulfillment.service_id,
            reused = fulfillment.reused,
            "Fulfilled request"
        );
        Message::Fulfillment(fulfillment)
    }
}

impl std::fmt::Debug for ProviderBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBot")
            .field("bot_id", &self.descriptor.bot_id)
            .field("ai", &self.ai.name())
            .field("cache_entries", &self.cache.len())
            .field("negotiations", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Registrable for ProviderBot {
    fn descriptor(&self) -> &BotDescriptor {
        &self.descriptor
    }
}

impl Negotiable for ProviderBot {
    fn on_request(&self, request: ServiceRequest) -> BoxFuture<'_, Message> {
        Box::pin(self.answer_request(request))
    }

    fn on_decision(&self, decision: DecisionMessage) -> BoxFuture<'_, Message> {
        Box::pin(self.answer_decision(decision))
    }
}

impl MessageHandler for ProviderBot {
    fn handle(&self, message: Message) -> BoxFuture<'_, Message> {
        match message {
            Message::Request(request) => self.on_request(request),
            Message::Decision(decision) => self.on_decision(decision),
            other => {
                let kind = other.kind();
                Box::pin(async move { Message::error(format!("provider does not handle '{kind}' messages")) })
            }
        }
    }
}

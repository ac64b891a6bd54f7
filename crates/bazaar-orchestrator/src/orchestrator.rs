//! The orchestration pipeline.
//!
//! `discover -> enhance -> select -> negotiate -> rank`
//!
//! Each AI stage degrades instead of failing: enhancement passes the
//! original through, selection falls back to history, and ranking falls
//! back to arrival order.

use std::sync::Arc;

use bazaar_agent::{AgentError, Deal, NegotiationDriver, Registrable};
use bazaar_core::{
    spawn_periodic, AiService, BotDescriptor, BotId, Directory, MarketError, RequestId, ServiceRequest,
};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, SelectionMode};
use crate::enhancer::Enhancer;
use crate::error::{OrchestratorError, Result};
use crate::history::{HistoryEntry, HistoryOutcome, RequestHistory};
use crate::proxy::PendingResults;
use crate::quality::QualityLedger;
use crate::ranker::{RankSource, RankedResponse, Ranker};
use crate::selector::{ProviderSelector, ScoreSource, Selection};

/// Result of orchestrating one request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratedResponse {
    /// The request as sent to providers.
    pub request: ServiceRequest,
    /// Whether enhancement succeeded.
    pub enhanced: bool,
    /// How candidates were scored.
    pub selection: ScoreSource,
    /// How responses were ordered.
    pub ranking: RankSource,
    /// Fulfilled responses, best first.
    pub responses: Vec<RankedResponse>,
    /// Negotiations that did not fulfill.
    pub failures: usize,
}

impl OrchestratedResponse {
    /// The best-ranked response.
    #[must_use]
    pub fn best(&self) -> Option<&RankedResponse> {
        self.responses.first()
    }
}

/// What one orchestrator sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorSweep {
    /// Proxied results that were never accepted.
    pub expired_pending: usize,
    /// Closed provider negotiations dropped.
    pub dropped_negotiations: usize,
}

/// An AI-assisted broker between requestors and providers.
pub struct Orchestrator {
    descriptor: BotDescriptor,
    directory: Arc<dyn Directory>,
    driver: NegotiationDriver,
    enhancer: Enhancer,
    selector: ProviderSelector,
    ranker: Ranker,
    ledger: Arc<QualityLedger>,
    history: RequestHistory,
    pub(crate) pending: PendingResults,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator that negotiates with providers through `driver`.
    #[must_use]
    pub fn new(
        descriptor: BotDescriptor,
        directory: Arc<dyn Directory>,
        driver: NegotiationDriver,
        ai: Arc<dyn AiService>,
        config: OrchestratorConfig,
    ) -> Self {
        let ledger = Arc::new(QualityLedger::new());
        Self {
            enhancer: Enhancer::new(ai.clone(), config.ai_timeout),
            selector: ProviderSelector::new(ai.clone(), ledger.clone(), &config),
            ranker: Ranker::new(ai, config.ai_timeout),
            history: RequestHistory::new(config.history_limit),
            pending: PendingResults::default(),
            descriptor,
            directory,
            driver,
            ledger,
            config,
        }
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Per-provider quality history.
    #[must_use]
    pub fn ledger(&self) -> &QualityLedger {
        &self.ledger
    }

    /// Recently orchestrated requests.
    #[must_use]
    pub const fn history(&self) -> &RequestHistory {
        &self.history
    }

    /// The driver holding provider negotiations.
    #[must_use]
    pub const fn driver(&self) -> &NegotiationDriver {
        &self.driver
    }

    /// Number of proxied results awaiting a decision.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Runs the full pipeline for `request`.
    ///
    /// # Errors
    ///
    /// - `DiscoveryEmpty` if no provider other than the requester advertises
    ///   the capability.
    /// - [`OrchestratorError::AllProvidersFailed`] if no negotiation fulfilled.
    pub async fn handle(&self, request: &ServiceRequest) -> Result<OrchestratedResponse> {
        let request_id = request.request_id();
        let capability = request.capability();
        let exclude = [request.requester_id().clone(), self.descriptor.bot_id.clone()];

        let candidates = match self.directory.discover(capability, &exclude).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "Discovery failed, treating market as empty");
                Vec::new()
            }
        };
        if candidates.is_empty() {
            let err = OrchestratorError::from(MarketError::DiscoveryEmpty {
                capability: capability.clone(),
            });
            self.record(request, false, Vec::new(), HistoryOutcome::Failed {
                reason: err.code().into(),
            });
            return Err(err);
        }

        let enhancement = self.enhancer.enhance(request).await;
        let outgoing = enhancement.request.forwarded_by(self.descriptor.bot_id.clone());

        let selection = match self.selector.select(candidates, &outgoing).await {
            Ok(selection) => selection,
            Err(err) => {
                self.record(request, enhancement.enhanced, Vec::new(), HistoryOutcome::Failed {
                    reason: err.code().into(),
                });
                return Err(err);
            }
        };
        let chosen: Vec<BotId> = selection.descriptors().map(|d| d.bot_id.clone()).collect();
        info!(
            request_id = %request_id,
            capability = %capability,
            enhanced = enhancement.enhanced,
            mode = %self.selector.mode(),
            candidates = chosen.len(),
            "Orchestrating request"
        );

        let (deals, mut failures) = match self.selector.mode() {
            SelectionMode::Sequential => self.negotiate_sequential(&selection, &outgoing).await,
            SelectionMode::FanOut => self.negotiate_fan_out(&selection, &outgoing).await,
        };

        if deals.is_empty() {
            let attempts = failures.len();
            let err = match failures.pop() {
                Some(last) => OrchestratorError::AllProvidersFailed {
                    request_id,
                    attempts,
                    last,
                },
                None => OrchestratorError::NoProviderAvailable {
                    capability: capability.clone(),
                },
            };
            warn!(request_id = %request_id, attempts, error = %err, "No provider fulfilled");
            self.record(request, enhancement.enhanced, chosen, HistoryOutcome::Failed {
                reason: err.code().into(),
            });
            return Err(err);
        }

        let ranking = self.ranker.rank(&outgoing, deals).await;
        if ranking.source == RankSource::Ai {
            for response in &ranking.responses {
                self.ledger.record(response.provider_id(), response.score);
            }
        }

        if let Some(best) = ranking.responses.first() {
            self.record(request, enhancement.enhanced, chosen, HistoryOutcome::Fulfilled {
                provider_id: best.provider_id().clone(),
                score: best.score,
                responses: ranking.responses.len(),
            });
        }

        Ok(OrchestratedResponse {
            request: outgoing,
            enhanced: enhancement.enhanced,
            selection: selection.source,
            ranking: ranking.source,
            responses: ranking.responses,
            failures: failures.len(),
        })
    }

    /// Abandons in-flight provider negotiations and any held result for
    /// `request_id`. Returns the number of negotiations expired.
    pub fn abandon(&self, request_id: RequestId) -> usize {
        self.pending.take(request_id);
        self.driver.abandon(request_id)
    }

    /// Drops proxied results past their deadline and stale negotiation
    /// records.
    pub fn sweep(&self, now: DateTime<Utc>) -> OrchestratorSweep {
        let expired_pending = self.pending.sweep(now);
        let table = self.driver.sweep(now, self.config.pending_ttl);
        let sweep = OrchestratorSweep {
            expired_pending,
            dropped_negotiations: table.dropped,
        };
        debug!(orchestrator = %self.descriptor.bot_id, ?sweep, "Orchestrator sweep");
        sweep
    }

    /// Runs [`Orchestrator::sweep`] every configured interval until
    /// `shutdown` turns true or its sender is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        spawn_periodic(
            format!("orchestrator {}", self.descriptor.bot_id),
            self.config.sweep_interval,
            shutdown,
            move || {
                orchestrator.sweep(Utc::now());
            },
        )
    }

    /// Drops held results, history, and quality data. Intended for shutdown.
    pub fn clear(&self) {
        self.pending.clear();
        self.history.clear();
        self.ledger.clear();
        self.driver.table().clear();
    }

    async fn negotiate_sequential(
        &self,
        selection: &Selection,
        request: &ServiceRequest,
    ) -> (Vec<Deal>, Vec<AgentError>) {
        let mut failures = Vec::new();
        for provider in selection.descriptors() {
            match self.driver.negotiate(provider, request).await {
                Ok(deal) => return (vec![deal], failures),
                Err(err @ AgentError::Abandoned(_)) => {
                    failures.push(err);
                    break;
                }
                Err(err) => {
                    debug!(
                        request_id = %request.request_id(),
                        provider = %provider.bot_id,
                        error = %err,
                        "Provider failed, trying next"
                    );
                    failures.push(err);
                }
            }
        }
        (Vec::new(), failures)
    }

    async fn negotiate_fan_out(
        &self,
        selection: &Selection,
        request: &ServiceRequest,
    ) -> (Vec<Deal>, Vec<AgentError>) {
        let mut inflight: FuturesUnordered<_> = selection
            .descriptors()
            .map(|provider| self.driver.negotiate(provider, request))
            .collect();

        let mut deals = Vec::new();
        let mut failures = Vec::new();
        while let Some(result) = inflight.next().await {
            match result {
                Ok(deal) => deals.push(deal),
                Err(err) => {
                    debug!(request_id = %request.request_id(), error = %err, "Fan-out negotiation failed");
                    failures.push(err);
                }
            }
        }
        (deals, failures)
    }

    fn record(&self, original: &ServiceRequest, enhanced: bool, candidates: Vec<BotId>, outcome: HistoryOutcome) {
        self.history.record(HistoryEntry {
            original: original.clone(),
            enhanced,
            candidates,
            outcome,
            recorded_at: Utc::now(),
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("bot_id", &self.descriptor.bot_id)
            .field("selector", &self.selector)
            .field("pending", &self.pending.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Registrable for Orchestrator {
    fn descriptor(&self) -> &BotDescriptor {
        &self.descriptor
    }
}

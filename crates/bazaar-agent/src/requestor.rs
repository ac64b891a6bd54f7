//! Requestor bot.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{
    spawn_periodic, BotDescriptor, Capability, Directory, MarketError, Parameters, RequestId, ServiceRequest,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{Deal, NegotiationDriver};
use crate::error::{AgentError, Result};
use crate::table::TableSweep;
use crate::traits::Registrable;

/// Default period of the requestor's record sweep.
pub const DEFAULT_REQUESTOR_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Default time closed negotiation records are kept.
pub const DEFAULT_REQUESTOR_GRACE: Duration = Duration::from_secs(600);

/// A bot that consumes services.
///
/// It can negotiate with providers directly (found through the directory or
/// named explicitly) or hand a request to an orchestrator, which answers
/// with the same offer and fulfillment contract.
pub struct RequestorBot {
    descriptor: BotDescriptor,
    directory: Arc<dyn Directory>,
    driver: NegotiationDriver,
    sweep_interval: Duration,
    grace: Duration,
}

impl RequestorBot {
    /// Creates a requestor that negotiates through `driver`.
    #[must_use]
    pub fn new(descriptor: BotDescriptor, directory: Arc<dyn Directory>, driver: NegotiationDriver) -> Self {
        Self {
            descriptor,
            directory,
            driver,
            sweep_interval: DEFAULT_REQUESTOR_SWEEP_INTERVAL,
            grace: DEFAULT_REQUESTOR_GRACE,
        }
    }

    /// Sets how often maintenance runs and how long closed records are kept.
    #[must_use]
    pub const fn with_retention(mut self, sweep_interval: Duration, grace: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self.grace = grace;
        self
    }

    /// The driver holding this bot's negotiation records.
    #[must_use]
    pub const fn driver(&self) -> &NegotiationDriver {
        &self.driver
    }

    /// Builds a request authored by this bot.
    #[must_use]
    pub fn compose(&self, capability: Capability, parameters: Parameters) -> ServiceRequest {
        ServiceRequest::new(self.descriptor.bot_id.clone(), capability).with_parameters(parameters)
    }

    /// Discovers providers and negotiates with each in discovery order until
    /// one fulfills.
    ///
    /// A directory failure is treated as an empty market.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryEmpty` when no provider advertises the capability,
    /// [`AgentError::Abandoned`] if the request was abandoned, or the last
    /// provider's failure when every provider declined.
    pub async fn request_direct(&self, request: &ServiceRequest) -> Result<Deal> {
        let capability = request.capability();
        let exclude = [self.descriptor.bot_id.clone()];
        let providers = match self.directory.discover(capability, &exclude).await {
            Ok(providers) => providers,
            Err(err) => {
                warn!(request_id = %request.request_id(), error = %err, "Discovery failed, treating market as empty");
                Vec::new()
            }
        };
        if providers.is_empty() {
            return Err(MarketError::DiscoveryEmpty {
                capability: capability.clone(),
            }
            .into());
        }
        debug!(request_id = %request.request_id(), candidates = providers.len(), "Discovered providers");

        let mut last_error = None;
        for provider in &providers {
            match self.driver.negotiate(provider, request).await {
                Ok(deal) => return Ok(deal),
                Err(err @ AgentError::Abandoned(_)) => return Err(err),
                Err(err) => {
                    debug!(
                        request_id = %request.request_id(),
                        provider = %provider.bot_id,
                        error = %err,
                        "Provider failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            MarketError::DiscoveryEmpty {
                capability: capability.clone(),
            }
            .into()
        }))
    }

    /// Negotiates with one named provider.
    ///
    /// # Errors
    ///
    /// Propagates the negotiation failure.
    pub async fn request_from(&self, provider: &BotDescriptor, request: &ServiceRequest) -> Result<Deal> {
        self.driver.negotiate(provider, request).await
    }

    /// Routes a request through an orchestrator.
    ///
    /// The deal's fulfillment carries the chosen provider and its quality
    /// score when the orchestrator supplies them.
    ///
    /// # Errors
    ///
    /// Propagates the negotiation failure.
    pub async fn request_via(&self, orchestrator: &BotDescriptor, request: &ServiceRequest) -> Result<Deal> {
        let deal = self.driver.negotiate_via(orchestrator, request).await?;
        info!(
            request_id = %request.request_id(),
            orchestrator = %orchestrator.bot_id,
            provider = ?deal.fulfillment.provider_id,
            "Orchestrated request fulfilled"
        );
        Ok(deal)
    }

    /// Abandons every open negotiation for `request_id`.
    pub fn abandon(&self, request_id: RequestId) -> usize {
        self.driver.abandon(request_id)
    }

    /// Sweeps the negotiation records once.
    pub fn maintain(&self, now: DateTime<Utc>) -> TableSweep {
        let sweep = self.driver.sweep(now, self.grace);
        debug!(
            requestor = %self.descriptor.bot_id,
            expired = sweep.expired.len(),
            dropped = sweep.dropped,
            "Requestor maintenance"
        );
        sweep
    }

    /// Runs [`RequestorBot::maintain`] every sweep interval until `shutdown`
    /// turns true or its sender is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let bot = Arc::clone(self);
        spawn_periodic(
            format!("requestor {}", self.descriptor.bot_id),
            self.sweep_interval,
            shutdown,
            move || {
                bot.maintain(Utc::now());
            },
        )
    }
}

impl std::fmt::Debug for RequestorBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestorBot")
            .field("bot_id", &self.descriptor.bot_id)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl Registrable for RequestorBot {
    fn descriptor(&self) -> &BotDescriptor {
        &self.descriptor
    }
}

//! An in-process market.
//!
//! Wires a mediator, two providers, an orchestrator and a requestor over a
//! [`LocalTransport`], then runs a direct request, an identical repeat that
//! hits the provider cache, and a request routed through the orchestrator.
//! Every bot and the mediator run their maintenance sweeps in the
//! background until the run ends.

use std::sync::Arc;
use std::time::Duration;

use bazaar_agent::{Deal, EventReporter, NegotiationDriver, ProviderBot, Registrable, RequestorBot};
use bazaar_cache::{CacheStats, ServiceCache};
use bazaar_core::{
    AiService, BotDescriptor, BotId, BotRole, Capability, Directory, LocalTransport, Parameters, ServiceId,
};
use bazaar_mediator::{EventFilter, Mediator, MediatorConfig, MediatorStats, RemoteDirectory, DEFAULT_MAX_EVENTS};
use bazaar_orchestrator::{Orchestrator, OrchestratorSweep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::MarketConfig;
use crate::error::Result;

/// What the demo asks for.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    /// Capability tag requested.
    pub capability: String,
    /// Request parameters.
    pub parameters: Parameters,
}

impl Default for DemoOptions {
    fn default() -> Self {
        let mut parameters = Parameters::new();
        parameters.insert("topic".to_string(), json!("AI trends"));
        Self {
            capability: "ai-news".to_string(),
            parameters,
        }
    }
}

/// One completed negotiation, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct DealSummary {
    /// Provider that produced the payload.
    pub provider_id: BotId,
    /// Endpoint that served it.
    pub service_id: ServiceId,
    /// True if served from an existing endpoint.
    pub reused: bool,
    /// Ranking score, when relayed by an orchestrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// When the endpoint expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Service payload.
    pub payload: Value,
}

impl From<Deal> for DealSummary {
    fn from(deal: Deal) -> Self {
        let fulfillment = deal.fulfillment;
        Self {
            provider_id: fulfillment.provider_id.unwrap_or(deal.provider_id),
            service_id: fulfillment.service_id,
            reused: fulfillment.reused,
            quality_score: fulfillment.quality_score,
            expires_at: fulfillment.expires_at,
            payload: fulfillment.payload,
        }
    }
}

/// Cache counters for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    /// Provider.
    pub provider_id: BotId,
    /// Its cache counters.
    pub cache: CacheStats,
}

/// Outcome of a demo run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    /// First direct request.
    pub direct: DealSummary,
    /// Identical second request.
    pub repeat: DealSummary,
    /// Request routed through the orchestrator.
    pub orchestrated: DealSummary,
    /// Per-provider cache counters.
    pub providers: Vec<ProviderReport>,
    /// Mediator registry sizes.
    pub mediator: MediatorStats,
    /// Orchestrator cleanup at the end of the run.
    pub orchestrator_sweep: OrchestratorSweep,
    /// Background maintenance tasks that stopped cleanly on shutdown.
    pub maintenance_stopped: usize,
}

const PROVIDERS: [(&str, &str); 2] = [
    ("news-desk", "Curated technology news"),
    ("trend-watch", "Trend analysis across AI research and industry"),
];
const ORCHESTRATOR: &str = "conductor";
const REQUESTOR: &str = "reader";

fn endpoint(bot: &str) -> String {
    format!("local://{bot}")
}

/// Runs the demo market once.
///
/// # Errors
///
/// Returns an error if the configuration is inconsistent, a bot cannot
/// register, or a request goes unfulfilled.
pub async fn run(config: &MarketConfig, ai: Arc<dyn AiService>, options: &DemoOptions) -> Result<DemoReport> {
    let catalog = config.catalog()?;
    let capability: Capability = catalog.parse(&options.capability)?;

    let mediator = Arc::new(Mediator::new(MediatorConfig {
        catalog,
        max_events: DEFAULT_MAX_EVENTS,
        sweep_interval: Duration::from_secs(config.mediator.sweep_interval_secs),
    }));
    let transport = Arc::new(LocalTransport::new());
    transport.bind(config.mediator.endpoint.clone(), mediator.clone());

    let directory: Arc<dyn Directory> = Arc::new(
        RemoteDirectory::new(transport.clone(), config.mediator.endpoint.clone())
            .with_timeout(Duration::from_millis(config.mediator.timeout_ms)),
    );
    let timeouts = config.negotiation_timeouts();
    let reporter = EventReporter::new(directory.clone(), timeouts.report);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut providers = Vec::new();
    let mut maintenance = vec![mediator.spawn_maintenance(shutdown_rx.clone())];
    for (id, description) in PROVIDERS {
        let descriptor = BotDescriptor::new(id, BotRole::Provider, endpoint(id))
            .with_description(description)
            .with_capability(capability.clone());
        let bot = Arc::new(ProviderBot::new(
            descriptor,
            ai.clone(),
            Arc::new(ServiceCache::new(config.cache_config()?)),
            reporter.clone(),
            config.provider_config(),
        ));
        transport.bind(endpoint(id), bot.clone());
        bot.register_with(directory.as_ref()).await?;
        maintenance.push(bot.spawn_maintenance(shutdown_rx.clone()));
        providers.push(bot);
    }

    let orchestrator = Arc::new(Orchestrator::new(
        BotDescriptor::new(ORCHESTRATOR, BotRole::Orchestrator, endpoint(ORCHESTRATOR))
            .with_description("Enhances requests and picks the best provider"),
        directory.clone(),
        NegotiationDriver::new(BotId::from(ORCHESTRATOR), transport.clone(), reporter.clone(), timeouts),
        ai,
        config.orchestrator_config(),
    ));
    transport.bind(endpoint(ORCHESTRATOR), orchestrator.clone());
    orchestrator.register_with(directory.as_ref()).await?;
    maintenance.push(orchestrator.spawn_maintenance(shutdown_rx.clone()));

    let (sweep_interval, grace) = config.requestor_retention();
    let requestor = Arc::new(
        RequestorBot::new(
            BotDescriptor::new(REQUESTOR, BotRole::Requestor, endpoint(REQUESTOR)),
            directory.clone(),
            NegotiationDriver::new(BotId::from(REQUESTOR), transport.clone(), reporter, timeouts),
        )
        .with_retention(sweep_interval, grace),
    );
    requestor.register_with(directory.as_ref()).await?;
    maintenance.push(requestor.spawn_maintenance(shutdown_rx));
    info!(
        capability = %capability,
        providers = providers.len(),
        proxy_offer_ms = u64::try_from(timeouts.proxy_offer.as_millis()).unwrap_or(u64::MAX),
        "Demo market ready"
    );

    let direct = requestor
        .request_direct(&requestor.compose(capability.clone(), options.parameters.clone()))
        .await?;
    let repeat = requestor
        .request_direct(&requestor.compose(capability.clone(), options.parameters.clone()))
        .await?;
    info!(
        provider = %repeat.provider_id,
        reused = repeat.fulfillment.reused,
        "Repeat request served"
    );

    let orchestrated = requestor
        .request_via(
            orchestrator.descriptor(),
            &requestor.compose(capability, options.parameters.clone()),
        )
        .await?;

    let orchestrator_sweep = orchestrator.sweep(Utc::now());
    let mut report = DemoReport {
        direct: direct.into(),
        repeat: repeat.into(),
        orchestrated: orchestrated.into(),
        providers: providers
            .iter()
            .map(|bot| ProviderReport {
                provider_id: bot.descriptor().bot_id.clone(),
                cache: bot.cache().stats(),
            })
            .collect(),
        mediator: mediator.stats(),
        orchestrator_sweep,
        maintenance_stopped: 0,
    };

    if shutdown_tx.send(true).is_err() {
        warn!("Maintenance tasks already stopped");
    }
    for handle in maintenance {
        match handle.await {
            Ok(()) => report.maintenance_stopped += 1,
            Err(err) => warn!(error = %err, "Maintenance task failed"),
        }
    }
    let events = mediator.events(&EventFilter::all(), usize::MAX).len();
    info!(events, "Demo finished");

    Ok(report)
}

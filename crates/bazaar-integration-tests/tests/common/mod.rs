//! Shared market wiring for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bazaar_agent::{
    EventReporter, NegotiationDriver, NegotiationTimeouts, ProviderBot, ProviderConfig, Registrable, RequestorBot,
};
use bazaar_cache::{CacheConfig, ServiceCache};
use bazaar_core::{
    AiError, AiService, BotDescriptor, BotId, BotRole, BoxFuture, Capability, Directory, Evaluation,
    LocalTransport, Parameters, ServiceRequest,
};
use bazaar_mediator::{Mediator, RemoteDirectory};
use bazaar_node::HeuristicAi;
use bazaar_orchestrator::{Orchestrator, OrchestratorConfig};
use serde_json::Value;

// ============================================================================
// AI double
// ============================================================================

/// Heuristic backend with a generation counter and optional faults.
#[derive(Default)]
pub struct TestAi {
    inner: HeuristicAi,
    generations: AtomicU32,
    evaluate_delay: Duration,
    generate_delay: Duration,
    enhance_fails: bool,
    payload: Option<Value>,
}

impl TestAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluate_delay(mut self, delay: Duration) -> Self {
        self.evaluate_delay = delay;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    pub fn with_enhance_outage(mut self) -> Self {
        self.enhance_fails = true;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn generations(&self) -> u32 {
        self.generations.load(Ordering::SeqCst)
    }
}

impl AiService for TestAi {
    fn evaluate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Evaluation, AiError>> {
        Box::pin(async move {
            tokio::time::sleep(self.evaluate_delay).await;
            self.inner.evaluate(capability, parameters).await
        })
    }

    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move {
            self.generations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.generate_delay).await;
            match &self.payload {
                Some(payload) => Ok(payload.clone()),
                None => self.inner.generate(capability, parameters).await,
            }
        })
    }

    fn enhance<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Result<Value, AiError>> {
        if self.enhance_fails {
            return Box::pin(async { Err(AiError::Unavailable("enhancer offline".into())) });
        }
        self.inner.enhance(request)
    }

    fn rank<'a>(
        &'a self,
        request: &'a ServiceRequest,
        payloads: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        self.inner.rank(request, payloads)
    }

    fn score_candidates<'a>(
        &'a self,
        request: &'a ServiceRequest,
        candidates: &'a [BotDescriptor],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        self.inner.score_candidates(request, candidates)
    }
}

// ============================================================================
// Market wiring
// ============================================================================

pub const MEDIATOR: &str = "local://mediator";

pub fn cap(tag: &str) -> Capability {
    Capability::new(tag).unwrap()
}

pub fn endpoint(id: &str) -> String {
    format!("local://{id}")
}

/// A mediator on a local transport, reached by every bot through a
/// [`RemoteDirectory`].
pub struct Market {
    pub mediator: Arc<Mediator>,
    pub transport: Arc<LocalTransport>,
    pub directory: Arc<dyn Directory>,
    pub timeouts: NegotiationTimeouts,
}

impl Market {
    pub fn new() -> Self {
        Self::with_timeouts(NegotiationTimeouts::default())
    }

    pub fn with_timeouts(timeouts: NegotiationTimeouts) -> Self {
        let mediator = Arc::new(Mediator::default());
        let transport = Arc::new(LocalTransport::new());
        transport.bind(MEDIATOR, mediator.clone());
        let directory: Arc<dyn Directory> = Arc::new(RemoteDirectory::new(transport.clone(), MEDIATOR));
        Self {
            mediator,
            transport,
            directory,
            timeouts,
        }
    }

    pub fn reporter(&self) -> EventReporter {
        EventReporter::new(self.directory.clone(), Duration::from_secs(1))
    }

    pub fn driver(&self, id: &str) -> NegotiationDriver {
        NegotiationDriver::new(
            BotId::from(id),
            self.transport.clone(),
            self.reporter(),
            self.timeouts,
        )
    }

    pub async fn add_provider(&self, id: &str, capability: &str, ai: Arc<dyn AiService>, ttl: Duration) -> Arc<ProviderBot> {
        let descriptor = BotDescriptor::new(id, BotRole::Provider, endpoint(id)).with_capability(cap(capability));
        let bot = Arc::new(ProviderBot::new(
            descriptor,
            ai,
            Arc::new(ServiceCache::new(CacheConfig::default().with_ttl(ttl))),
            self.reporter(),
            ProviderConfig::default(),
        ));
        self.transport.bind(endpoint(id), bot.clone());
        bot.register_with(self.directory.as_ref()).await.unwrap();
        bot
    }

    pub async fn add_requestor(&self, id: &str) -> RequestorBot {
        let bot = RequestorBot::new(
            BotDescriptor::new(id, BotRole::Requestor, endpoint(id)),
            self.directory.clone(),
            self.driver(id),
        );
        bot.register_with(self.directory.as_ref()).await.unwrap();
        bot
    }

    pub async fn add_orchestrator(&self, id: &str, ai: Arc<dyn AiService>, config: OrchestratorConfig) -> Arc<Orchestrator> {
        let bot = Arc::new(Orchestrator::new(
            BotDescriptor::new(id, BotRole::Orchestrator, endpoint(id)),
            self.directory.clone(),
            self.driver(id),
            ai,
            config,
        ));
        self.transport.bind(endpoint(id), bot.clone());
        bot.register_with(self.directory.as_ref()).await.unwrap();
        bot
    }
}

/// Polls `check` until it holds, for up to one second.
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

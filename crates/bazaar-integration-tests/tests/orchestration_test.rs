//! Integration tests for orchestrated trades.
//!
//! Tests the orchestrator pipeline against real providers:
//! 1. Enhancement and its outage fallback
//! 2. Fan-out negotiation and AI ranking
//! 3. Transparent proxy mode for ordinary requestors
//! 4. Provider dedup of enhanced requests

mod common;

use std::sync::Arc;
use std::time::Duration;

use bazaar_agent::{AgentError, NegotiationTimeouts, Registrable};
use bazaar_core::{BotId, MarketError, Parameters};
use bazaar_orchestrator::{HistoryOutcome, OrchestratorConfig, RankSource, ScoreSource, SelectionMode};
use common::{cap, Market, TestAi};
use serde_json::json;

const TTL: Duration = Duration::from_secs(300);

fn topic(text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("topic".to_string(), json!(text));
    parameters
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn fan_out_ranks_richer_payloads_first() {
    let market = Market::new();
    market
        .add_provider("thin", "ai-news", Arc::new(TestAi::new().with_payload(json!({"headline": "AI"}))), TTL)
        .await;
    market
        .add_provider(
            "rich",
            "ai-news",
            Arc::new(TestAi::new().with_payload(json!({"items": [1, 2, 3, 4], "source": "wire"}))),
            TTL,
        )
        .await;
    let orchestrator = market
        .add_orchestrator(
            "conductor",
            Arc::new(TestAi::new()),
            OrchestratorConfig::default().with_mode(SelectionMode::FanOut),
        )
        .await;
    let alice = market.add_requestor("alice").await;

    let request = alice.compose(cap("ai-news"), topic("AI trends"));
    let response = orchestrator.handle(&request).await.unwrap();

    assert!(response.enhanced);
    assert_eq!(response.selection, ScoreSource::Ai);
    assert_eq!(response.ranking, RankSource::Ai);
    assert_eq!(response.responses.len(), 2);
    assert_eq!(response.failures, 0);

    let best = response.best().unwrap();
    assert_eq!(best.provider_id().as_str(), "rich");
    assert_eq!(best.rank, 1);
    assert!((best.score - 1.0).abs() < f64::EPSILON);
    assert!((response.responses[1].score - 0.2).abs() < 1e-9);

    let ledger = orchestrator.ledger();
    assert!((ledger.score(&BotId::from("rich")).unwrap() - 1.0).abs() < f64::EPSILON);
    assert!(ledger.score(&BotId::from("thin")).unwrap() < 0.5);

    let entry = orchestrator.history().get(request.request_id()).unwrap();
    assert!(entry.enhanced);
    assert_eq!(entry.candidates.len(), 2);
    assert!(matches!(
        entry.outcome,
        HistoryOutcome::Fulfilled { ref provider_id, responses: 2, .. } if provider_id.as_str() == "rich"
    ));
}

#[tokio::test]
async fn enhanced_requests_are_forwarded_with_hints() {
    let market = Market::new();
    let provider = market
        .add_provider("news-desk", "ai-news", Arc::new(TestAi::new()), TTL)
        .await;
    let orchestrator = market
        .add_orchestrator("conductor", Arc::new(TestAi::new()), OrchestratorConfig::default())
        .await;
    let alice = market.add_requestor("alice").await;

    let response = orchestrator
        .handle(&alice.compose(cap("ai-news"), topic("  AI   trends")))
        .await
        .unwrap();

    let outgoing = &response.request;
    assert!(outgoing.is_enhanced());
    assert_eq!(outgoing.requester_id().as_str(), "conductor");
    let effective = outgoing.effective_parameters();
    assert_eq!(effective["topic"], "AI trends");
    assert_eq!(effective["limit"], 5);
    assert_eq!(outgoing.parameters()["topic"], "  AI   trends");

    assert_eq!(response.ranking, RankSource::Trivial);
    assert_eq!(provider.cache().len(), 1);
}

#[tokio::test]
async fn enhancement_outage_passes_the_original_through() {
    let market = Market::new();
    market
        .add_provider("news-desk", "ai-news", Arc::new(TestAi::new()), TTL)
        .await;
    let orchestrator = market
        .add_orchestrator(
            "conductor",
            Arc::new(TestAi::new().with_enhance_outage()),
            OrchestratorConfig::default(),
        )
        .await;
    let alice = market.add_requestor("alice").await;

    let response = orchestrator
        .handle(&alice.compose(cap("ai-news"), topic("AI trends")))
        .await
        .unwrap();

    assert!(!response.enhanced);
    assert!(!response.request.is_enhanced());
    assert_eq!(response.request.parameters(), &topic("AI trends"));
    assert_eq!(response.best().unwrap().provider_id().as_str(), "news-desk");
}

// ============================================================================
// Proxy mode
// ============================================================================

#[tokio::test]
async fn requestor_trades_through_the_orchestrator_proxy() {
    let market = Market::new();
    market
        .add_provider("news-desk", "ai-news", Arc::new(TestAi::new()), TTL)
        .await;
    let orchestrator = market
        .add_orchestrator("conductor", Arc::new(TestAi::new()), OrchestratorConfig::default())
        .await;
    let alice = market.add_requestor("alice").await;

    let request = alice.compose(cap("ai-news"), topic("AI trends"));
    let deal = alice
        .request_via(orchestrator.descriptor(), &request)
        .await
        .unwrap();

    assert_eq!(deal.fulfillment.request_id, request.request_id());
    assert_eq!(
        deal.fulfillment.provider_id.as_ref().map(BotId::as_str),
        Some("news-desk")
    );
    assert_eq!(deal.fulfillment.quality_score, Some(1.0));
    assert!(deal.terms.cached);
    assert_eq!(deal.fulfillment.payload["trends"].as_array().map(Vec::len), Some(5));
    assert_eq!(orchestrator.pending(), 0);
}

#[tokio::test]
async fn equivalent_requests_share_an_endpoint_through_the_orchestrator() {
    let market = Market::new();
    let ai = Arc::new(TestAi::new());
    let provider = market.add_provider("news-desk", "ai-news", ai.clone(), TTL).await;
    let orchestrator = market
        .add_orchestrator("conductor", Arc::new(TestAi::new()), OrchestratorConfig::default())
        .await;
    let alice = market.add_requestor("alice").await;
    let bob = market.add_requestor("bob").await;

    let first = alice
        .request_via(orchestrator.descriptor(), &alice.compose(cap("ai-news"), topic("AI trends")))
        .await
        .unwrap();
    let second = bob
        .request_via(orchestrator.descriptor(), &bob.compose(cap("ai-news"), topic(" AI  trends ")))
        .await
        .unwrap();

    assert!(!first.fulfillment.reused);
    assert!(second.fulfillment.reused);
    assert_eq!(first.fulfillment.service_id, second.fulfillment.service_id);
    assert_eq!(ai.generations(), 1);
    assert_eq!(provider.cache().stats().hits, 1);
    assert_eq!(orchestrator.history().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn proxied_request_outlasts_a_stalling_provider() {
    let config = OrchestratorConfig::default();
    let provider_bounds = NegotiationTimeouts {
        offer: Duration::from_millis(200),
        fulfillment: Duration::from_secs(2),
        ..NegotiationTimeouts::default()
    };
    let market = Market::with_timeouts(NegotiationTimeouts {
        proxy_offer: config.proxy_offer_bound(&provider_bounds),
        ..provider_bounds
    });
    market
        .add_provider(
            "stalled",
            "ai-news",
            Arc::new(TestAi::new().with_evaluate_delay(Duration::from_secs(2))),
            TTL,
        )
        .await;
    market
        .add_provider("news-desk", "ai-news", Arc::new(TestAi::new()), TTL)
        .await;
    let orchestrator = market
        .add_orchestrator("conductor", Arc::new(TestAi::new()), config)
        .await;
    let alice = market.add_requestor("alice").await;

    let request = alice.compose(cap("ai-news"), topic("AI trends"));
    let deal = alice
        .request_via(orchestrator.descriptor(), &request)
        .await
        .unwrap();
    assert_eq!(
        deal.fulfillment.provider_id.as_ref().map(BotId::as_str),
        Some("news-desk")
    );
    let entry = orchestrator.history().get(request.request_id()).unwrap();
    assert_eq!(entry.candidates.len(), 2);

    // Treating the orchestrator like a plain provider gives up during the
    // orchestrator's first, stalled negotiation.
    let err = alice
        .request_from(orchestrator.descriptor(), &alice.compose(cap("ai-news"), topic("AI trends")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Market(MarketError::NegotiationTimeout { ref stage, .. }) if stage == "offer"
    ));
}

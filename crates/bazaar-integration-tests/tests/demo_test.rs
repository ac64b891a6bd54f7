//! Integration tests for the node's demo market and configuration.

use std::sync::Arc;

use bazaar_node::config::MarketConfig;
use bazaar_node::{build_ai, demo, DemoOptions, HeuristicAi, NodeError};
use serde_json::json;

#[tokio::test]
async fn demo_market_reuses_the_first_endpoint() {
    let config = MarketConfig::default();
    let ai = build_ai(&config).unwrap();

    let report = demo::run(&config, ai, &DemoOptions::default()).await.unwrap();

    assert!(!report.direct.reused);
    assert!(report.repeat.reused);
    assert_eq!(report.direct.service_id, report.repeat.service_id);
    assert_eq!(report.direct.provider_id.as_str(), "news-desk");
    assert_eq!(report.direct.payload["trends"].as_array().map(Vec::len), Some(5));

    assert!(report.orchestrated.quality_score.is_some());
    assert_eq!(report.mediator.bots, 4);
    assert_eq!(report.providers.len(), 2);

    let hits: u64 = report.providers.iter().map(|p| p.cache.hits).sum();
    let generations: u64 = report.providers.iter().map(|p| p.cache.generations).sum();
    assert_eq!(hits, 1);
    assert_eq!(generations, 2);
    assert_eq!(report.orchestrator_sweep.expired_pending, 0);
    // mediator, two providers, orchestrator, requestor
    assert_eq!(report.maintenance_stopped, 5);

    let rendered = serde_json::to_value(&report).unwrap();
    assert_eq!(rendered["repeat"]["reused"], json!(true));
}

#[tokio::test]
async fn demo_honours_the_capability_catalog() {
    let config = MarketConfig::from_toml("capabilities = [\"finance\"]").unwrap();
    let options = DemoOptions::default();

    let err = demo::run(&config, Arc::new(HeuristicAi::new()), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Capability(_)));
}

#[tokio::test]
async fn demo_serves_finance_requests() {
    let config = MarketConfig::from_toml(
        r#"
        [provider]
        ttl_secs = 300

        [orchestrator]
        mode = "fan_out"
        "#,
    )
    .unwrap();
    let mut options = DemoOptions {
        capability: "finance".to_string(),
        ..DemoOptions::default()
    };
    options.parameters.clear();
    options.parameters.insert("query".to_string(), json!("AAPL stock"));

    let report = demo::run(&config, Arc::new(HeuristicAi::new()), &options).await.unwrap();

    assert_eq!(report.direct.payload["symbol"], "AAPL");
    assert_eq!(report.direct.payload["data"].as_array().map(Vec::len), Some(90));
    assert!(report.repeat.reused);
    let orchestrated = &report.orchestrated;
    assert!(orchestrated.quality_score.is_some());
    let expires = report.direct.expires_at.unwrap();
    let remaining = expires - chrono::Utc::now();
    assert!(remaining.num_seconds() <= 300);
}

//! Offline AI backend.
//!
//! Answers every [`AiService`] call from local rules and demo data, so a
//! market can run without network access or credentials. Enhancement is
//! deterministic: identical requests keep identical fingerprints after
//! passing through an orchestrator.

use bazaar_core::{
    normalize_text, AiError, AiService, BotDescriptor, BoxFuture, Capability, Evaluation, Parameters,
    ServiceRequest,
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{json, Value};

const KNOWN_CONFIDENCE: f64 = 0.9;
const UNKNOWN_CONFIDENCE: f64 = 0.6;
const FAMILIES: [&str; 4] = ["trend", "news", "finance", "stock"];
const STOCKS: [(&str, &str); 5] = [
    ("AAPL", "Apple Inc."),
    ("MSFT", "Microsoft Corporation"),
    ("GOOGL", "Alphabet Inc."),
    ("AMZN", "Amazon.com, Inc."),
    ("META", "Meta Platforms, Inc."),
];
const QUARTER_DAYS: i64 = 90;

/// Rule-based [`AiService`] with demo payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAi;

impl HeuristicAi {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AiService for HeuristicAi {
    fn evaluate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Evaluation, AiError>> {
        Box::pin(async move { Ok(evaluate(capability, parameters)) })
    }

    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move { Ok(generate(capability, parameters)) })
    }

    fn enhance<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move { Ok(Value::Object(enhance(request))) })
    }

    fn rank<'a>(
        &'a self,
        _request: &'a ServiceRequest,
        payloads: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move { Ok(rank(payloads)) })
    }

    fn score_candidates<'a>(
        &'a self,
        _request: &'a ServiceRequest,
        candidates: &'a [BotDescriptor],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move {
            Ok(candidates
                .iter()
                .map(|c| 0.6 + 0.4 / c.capabilities.len().max(1) as f64)
                .collect())
        })
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Lowercased text of the capability and every string parameter.
fn subject(capability: &Capability, parameters: &Parameters) -> String {
    let mut text = capability.as_str().to_string();
    for value in parameters.values() {
        if let Value::String(s) = value {
            text.push(' ');
            text.push_str(&s.to_lowercase());
        }
    }
    text
}

fn evaluate(capability: &Capability, parameters: &Parameters) -> Evaluation {
    let text = subject(capability, parameters);
    match FAMILIES.iter().find(|family| text.contains(**family)) {
        Some(family) => {
            Evaluation::new(true, KNOWN_CONFIDENCE).with_reasoning(format!("matches the {family} family"))
        }
        None => Evaluation::new(true, UNKNOWN_CONFIDENCE).with_reasoning("generic data only"),
    }
}

fn generate(capability: &Capability, parameters: &Parameters) -> Value {
    let text = subject(capability, parameters);
    if text.contains("trend") {
        return ai_trends();
    }
    if capability.as_str().contains("finance") || text.contains("stock") {
        let symbol = STOCKS
            .iter()
            .find(|(symbol, _)| text.contains(&symbol.to_lowercase()))
            .copied();
        return match symbol {
            Some(stock) => stock_quarter(stock),
            None if text.contains("stock") => {
                let pick = rand::thread_rng().gen_range(0..STOCKS.len());
                stock_quarter(STOCKS[pick])
            }
            None => market_summary(),
        };
    }
    generic(capability, parameters)
}

fn ai_trends() -> Value {
    json!({
        "trends": [
            {
                "trend_name": "Multimodal LLMs",
                "description": "Language models that process text, images, and audio together",
                "popularity": 95,
                "category": "LLM",
                "key_companies": ["OpenAI", "Anthropic", "Google", "Meta"]
            },
            {
                "trend_name": "AI Agents",
                "description": "Autonomous systems that carry out tasks without human intervention",
                "popularity": 88,
                "category": "LLM",
                "key_companies": ["Anthropic", "OpenAI", "Google DeepMind"]
            },
            {
                "trend_name": "Generative Video Models",
                "description": "Models that generate video from text prompts",
                "popularity": 82,
                "category": "Computer Vision",
                "key_companies": ["Runway", "OpenAI", "Stability AI"]
            },
            {
                "trend_name": "On-Device AI",
                "description": "Running models locally on phones and laptops",
                "popularity": 79,
                "category": "ML Ops",
                "key_companies": ["Apple", "Google", "Qualcomm", "Samsung"]
            },
            {
                "trend_name": "Synthetic Data Generation",
                "description": "Artificial datasets for training models",
                "popularity": 76,
                "category": "ML Ops",
                "key_companies": ["Mostly AI", "Synthesis AI", "Gretel"]
            }
        ],
        "source": "bazaar heuristic backend"
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn stock_quarter((symbol, name): (&str, &str)) -> Value {
    let mut rng = rand::thread_rng();
    let today = Utc::now().date_naive();
    let mut price: f64 = rng.gen_range(100.0..500.0);
    let mut days = Vec::new();

    for offset in (0..QUARTER_DAYS).rev() {
        let open = price * (1.0 + rng.gen_range(-0.05_f64..0.05));
        let close = open * (1.0 + rng.gen_range(-0.02_f64..0.02));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0_f64..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0_f64..0.01));
        let volume: u64 = rng.gen_range(1_000_000..10_000_000);
        let date = today - Duration::days(offset);
        days.push(json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "open": round2(open),
            "high": round2(high),
            "low": round2(low),
            "close": round2(close),
            "volume": volume,
        }));
        price = close;
    }

    json!({
        "symbol": symbol,
        "name": name,
        "period": "last_quarter",
        "data": days,
    })
}

fn market_summary() -> Value {
    json!({
        "market_summary": {
            "indices": [
                {"name": "S&P 500", "value": 5824.15, "change": 0.67},
                {"name": "Dow Jones", "value": 41283.45, "change": 0.43},
                {"name": "NASDAQ", "value": 18765.32, "change": 0.91},
                {"name": "Russell 2000", "value": 2345.67, "change": -0.21}
            ],
            "sectors": [
                {"name": "Technology", "change": 1.23},
                {"name": "Healthcare", "change": 0.54},
                {"name": "Financial", "change": -0.32},
                {"name": "Energy", "change": 0.87},
                {"name": "Consumer Cyclical", "change": 0.12}
            ]
        }
    })
}

fn generic(capability: &Capability, parameters: &Parameters) -> Value {
    let mut rng = rand::thread_rng();
    let values: Vec<u32> = (0..5).map(|_| rng.gen_range(1..=100)).collect();
    json!({
        "message": format!("Data for {capability}"),
        "parameters": parameters,
        "generated_at": Utc::now().to_rfc3339(),
        "data": {
            "sample": "This is sample data",
            "values": values,
        }
    })
}

/// Normalized string parameters plus capability hints that are not already
/// present.
fn enhance(request: &ServiceRequest) -> Parameters {
    let mut enhanced = Parameters::new();
    for (key, value) in request.parameters() {
        if let Value::String(s) = value {
            enhanced.insert(key.clone(), Value::String(normalize_text(s)));
        }
    }

    let text = subject(request.capability(), request.parameters());
    let mut hint = |key: &str, value: Value| {
        if !request.parameters().contains_key(key) {
            enhanced.insert(key.to_string(), value);
        }
    };
    if text.contains("trend") || text.contains("news") {
        hint("limit", json!(5));
    }
    if text.contains("finance") || text.contains("stock") {
        hint("period", json!("last_quarter"));
        hint("currency", json!("USD"));
    }
    hint("format", json!("json"));
    enhanced
}

fn leaves(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.iter().map(leaves).sum(),
        Value::Object(map) => map.values().map(leaves).sum(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Scores payloads by how much data they carry, relative to the richest.
fn rank(payloads: &[Value]) -> Vec<f64> {
    let counts: Vec<usize> = payloads.iter().map(leaves).collect();
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0.5; payloads.len()];
    }
    counts.into_iter().map(|c| c as f64 / max as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{BotId, BotRole, Fingerprint};

    fn cap(tag: &str) -> Capability {
        Capability::new(tag).unwrap()
    }

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn evaluates_known_families_higher() {
        let ai = HeuristicAi::new();
        let news = ai.evaluate(&cap("ai-news"), &Parameters::new()).await.unwrap();
        let other = ai.evaluate(&cap("weather"), &Parameters::new()).await.unwrap();
        assert!(news.can_fulfill && other.can_fulfill);
        assert!((news.confidence - 0.9).abs() < f64::EPSILON);
        assert!((other.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn generates_trends_for_trend_topics() {
        let ai = HeuristicAi::new();
        let payload = ai
            .generate(&cap("ai-news"), &params(&[("topic", json!("AI trends"))]))
            .await
            .unwrap();
        assert_eq!(payload["trends"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn generates_named_stock_quarter() {
        let ai = HeuristicAi::new();
        let payload = ai
            .generate(&cap("finance"), &params(&[("query", json!("MSFT stock"))]))
            .await
            .unwrap();
        assert_eq!(payload["symbol"], "MSFT");
        let days = payload["data"].as_array().unwrap();
        assert_eq!(days.len(), 90);
        for day in days {
            assert!(day["high"].as_f64().unwrap() >= day["low"].as_f64().unwrap());
        }
    }

    #[tokio::test]
    async fn generates_market_summary_without_stock() {
        let ai = HeuristicAi::new();
        let payload = ai.generate(&cap("finance"), &Parameters::new()).await.unwrap();
        assert!(payload["market_summary"]["indices"].is_array());
    }

    #[tokio::test]
    async fn generates_generic_data() {
        let ai = HeuristicAi::new();
        let payload = ai
            .generate(&cap("weather"), &params(&[("city", json!("Oslo"))]))
            .await
            .unwrap();
        assert_eq!(payload["message"], "Data for weather");
        assert_eq!(payload["parameters"]["city"], "Oslo");
        assert_eq!(payload["data"]["values"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn enhancement_is_deterministic_and_keeps_caller_values() {
        let ai = HeuristicAi::new();
        let a = ServiceRequest::new(BotId::from("a"), cap("ai-news"))
            .with_parameter("topic", json!("  AI   trends "))
            .with_parameter("limit", json!(3));
        let b = ServiceRequest::new(BotId::from("b"), cap("ai-news"))
            .with_parameter("topic", json!("AI trends"))
            .with_parameter("limit", json!(3));

        let ea = ai.enhance(&a).await.unwrap().as_object().cloned().unwrap();
        let eb = ai.enhance(&b).await.unwrap().as_object().cloned().unwrap();
        assert_eq!(ea["topic"], "AI trends");
        assert!(!ea.contains_key("limit"));
        assert_eq!(ea["format"], "json");

        let mut pa = a.parameters().clone();
        pa.extend(ea);
        let mut pb = b.parameters().clone();
        pb.extend(eb);
        assert_eq!(
            Fingerprint::of_request(&a.with_enhancement(pa)),
            Fingerprint::of_request(&b.with_enhancement(pb))
        );
    }

    #[test]
    fn rank_prefers_richer_payloads() {
        let scores = rank(&[json!({"a": 1}), json!({"a": 1, "b": [1, 2, 3]}), json!(null)]);
        assert!((scores[0] - 0.25).abs() < f64::EPSILON);
        assert!((scores[1] - 1.0).abs() < f64::EPSILON);
        assert!(scores[2].abs() < f64::EPSILON);
        assert_eq!(rank(&[json!({}), json!([])]), vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn specialists_score_higher() {
        let ai = HeuristicAi::new();
        let specialist =
            BotDescriptor::new("s", BotRole::Provider, "local://s").with_capability(cap("ai-news"));
        let generalist = BotDescriptor::new("g", BotRole::Provider, "local://g")
            .with_capabilities([cap("ai-news"), cap("finance"), cap("weather"), cap("sports")]);
        let request = ServiceRequest::new(BotId::from("r"), cap("ai-news"));
        let scores = ai
            .score_candidates(&request, &[specialist, generalist])
            .await
            .unwrap();
        assert!((scores[0] - 1.0).abs() < f64::EPSILON);
        assert!((scores[1] - 0.7).abs() < f64::EPSILON);
    }
}

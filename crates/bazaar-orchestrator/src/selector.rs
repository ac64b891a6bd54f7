//! Provider selection.
//!
//! Candidates are scored by the AI service. When that fails the selector
//! falls back to each provider's historical quality, and with no history
//! at all it keeps discovery order.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{call_with_timeout, AiService, BotDescriptor, ServiceRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{OrchestratorConfig, SelectionMode};
use crate::error::{OrchestratorError, Result};
use crate::quality::QualityLedger;

/// Score given to a provider with no history when ranking by history.
const NEUTRAL_QUALITY: f64 = 0.5;

/// Where candidate scores came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// The AI service.
    Ai,
    /// The quality ledger.
    History,
    /// No scores; discovery order.
    DiscoveryOrder,
}

/// A candidate and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// The provider.
    pub descriptor: BotDescriptor,
    /// Selection score in `[0, 1]`.
    pub score: f64,
}

/// Providers chosen for one request, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Chosen candidates.
    pub candidates: Vec<ScoredCandidate>,
    /// How the scores were obtained.
    pub source: ScoreSource,
}

impl Selection {
    /// The chosen providers in negotiation order.
    pub fn descriptors(&self) -> impl Iterator<Item = &BotDescriptor> {
        self.candidates.iter().map(|c| &c.descriptor)
    }
}

/// Chooses which providers to negotiate with.
#[derive(Clone)]
pub struct ProviderSelector {
    ai: Arc<dyn AiService>,
    ledger: Arc<QualityLedger>,
    mode: SelectionMode,
    min_confidence: f64,
    max_attempts: usize,
    fan_out_limit: Option<usize>,
    timeout: Duration,
}

impl ProviderSelector {
    /// Creates a selector from orchestrator settings.
    #[must_use]
    pub fn new(ai: Arc<dyn AiService>, ledger: Arc<QualityLedger>, config: &OrchestratorConfig) -> Self {
        Self {
            ai,
            ledger,
            mode: config.mode,
            min_confidence: config.min_confidence,
            max_attempts: config.max_attempts.max(1),
            fan_out_limit: config.fan_out_limit,
            timeout: config.ai_timeout,
        }
    }

    /// Selection mode.
    #[must_use]
    pub const fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Scores `candidates` and picks the ones to negotiate with.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NoProviderAvailable`] if `candidates` is
    /// empty.
    pub async fn select(&self, candidates: Vec<BotDescriptor>, request: &ServiceRequest) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(OrchestratorError::NoProviderAvailable {
                capability: request.capability().clone(),
            });
        }

        let (scores, source) = self.score(&candidates, request).await;
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(descriptor, score)| ScoredCandidate { descriptor, score })
            .collect();
        // Stable sort keeps discovery order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let candidates = match self.mode {
            SelectionMode::Sequential => {
                scored.truncate(self.max_attempts);
                scored
            }
            SelectionMode::FanOut => {
                let passing = scored.iter().filter(|c| c.score >= self.min_confidence).count();
                if passing > 0 {
                    scored.truncate(passing);
                } else {
                    debug!(request_id = %request.request_id(), "No candidate passed the floor, fanning out to all");
                }
                if let Some(limit) = self.fan_out_limit {
                    scored.truncate(limit.max(1));
                }
                scored
            }
        };

        debug!(
            request_id = %request.request_id(),
            mode = %self.mode,
            source = ?source,
            selected = candidates.len(),
            "Selected providers"
        );
        Ok(Selection { candidates, source })
    }

    async fn score(&self, candidates: &[BotDescriptor], request: &ServiceRequest) -> (Vec<f64>, ScoreSource) {
        let scored = call_with_timeout(self.timeout, self.ai.score_candidates(request, candidates)).await;
        match scored {
            Ok(scores) if scores.len() == candidates.len() => {
                return (scores.into_iter().map(sanitize).collect(), ScoreSource::Ai);
            }
            Ok(scores) => warn!(
                request_id = %request.request_id(),
                expected = candidates.len(),
                got = scores.len(),
                "Candidate scores had the wrong length, using history"
            ),
            Err(err) => warn!(request_id = %request.request_id(), error = %err, "Candidate scoring failed, using history"),
        }

        let history: Vec<Option<f64>> = candidates.iter().map(|c| self.ledger.score(&c.bot_id)).collect();
        if history.iter().any(Option::is_some) {
            let scores = history.into_iter().map(|s| s.unwrap_or(NEUTRAL_QUALITY)).collect();
            return (scores, ScoreSource::History);
        }
        (vec![0.0; candidates.len()], ScoreSource::DiscoveryOrder)
    }
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("mode", &self.mode)
            .field("min_confidence", &self.min_confidence)
            .field("max_attempts", &self.max_attempts)
            .field("fan_out_limit", &self.fan_out_limit)
            .finish_non_exhaustive()
    }
}

/// Maps non-finite scores to zero and clamps the rest to `[0, 1]`.
pub(crate) fn sanitize(score: f64) -> f64 {
    if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAi;
    use bazaar_core::{AiError, BotId, BotRole, Capability};
    use test_case::test_case;

    fn make_candidates(ids: &[&str]) -> Vec<BotDescriptor> {
        ids.iter()
            .map(|id| BotDescriptor::new(*id, BotRole::Provider, format!("local://{id}")))
            .collect()
    }

    fn make_request() -> ServiceRequest {
        ServiceRequest::new(BotId::from("reader"), Capability::new("ai-news").unwrap())
    }

    fn make_selector(ai: ScriptedAi, ledger: Arc<QualityLedger>, config: &OrchestratorConfig) -> ProviderSelector {
        ProviderSelector::new(Arc::new(ai), ledger, config)
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.descriptors().map(|d| d.bot_id.as_str()).collect()
    }

    #[tokio::test]
    async fn empty_candidates_is_no_provider() {
        let selector = make_selector(ScriptedAi::default(), Arc::default(), &OrchestratorConfig::default());
        let err = selector.select(Vec::new(), &make_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoProviderAvailable { .. }));
    }

    #[tokio::test]
    async fn sequential_orders_by_ai_score_then_discovery() {
        let ai = ScriptedAi::default().with_candidate_scores(Ok(vec![0.4, 0.9, 0.9, 0.1]));
        let config = OrchestratorConfig {
            max_attempts: 3,
            ..OrchestratorConfig::default()
        };
        let selector = make_selector(ai, Arc::default(), &config);

        let selection = selector
            .select(make_candidates(&["a", "b", "c", "d"]), &make_request())
            .await
            .unwrap();
        assert_eq!(selection.source, ScoreSource::Ai);
        assert_eq!(ids(&selection), vec!["b", "c", "a"]);
    }

    #[test_case(vec![0.9, 0.2, 0.75], None, &["a", "c"] ; "only passing candidates")]
    #[test_case(vec![0.1, 0.2, 0.3], None, &["c", "b", "a"] ; "all when none pass")]
    #[test_case(vec![0.9, 0.8, 0.75], Some(2), &["a", "b"] ; "limit truncates")]
    #[tokio::test]
    async fn fan_out_floor(scores: Vec<f64>, limit: Option<usize>, expected: &[&str]) {
        let ai = ScriptedAi::default().with_candidate_scores(Ok(scores));
        let config = OrchestratorConfig {
            mode: SelectionMode::FanOut,
            fan_out_limit: limit,
            ..OrchestratorConfig::default()
        };
        let selector = make_selector(ai, Arc::default(), &config);

        let selection = selector
            .select(make_candidates(&["a", "b", "c"]), &make_request())
            .await
            .unwrap();
        assert_eq!(ids(&selection), expected);
    }

    #[tokio::test]
    async fn wrong_length_falls_back_to_history() {
        let ledger = Arc::new(QualityLedger::new());
        ledger.record(&BotId::from("b"), 0.9);
        ledger.record(&BotId::from("a"), 0.2);
        let ai = ScriptedAi::default().with_candidate_scores(Ok(vec![1.0]));
        let selector = make_selector(ai, ledger, &OrchestratorConfig::default());

        let selection = selector
            .select(make_candidates(&["a", "b", "c"]), &make_request())
            .await
            .unwrap();
        assert_eq!(selection.source, ScoreSource::History);
        assert_eq!(ids(&selection), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn no_history_keeps_discovery_order() {
        let ai = ScriptedAi::default().with_candidate_scores(Err(AiError::Unavailable("down".into())));
        let selector = make_selector(ai, Arc::default(), &OrchestratorConfig::default());

        let selection = selector
            .select(make_candidates(&["a", "b", "c", "d"]), &make_request())
            .await
            .unwrap();
        assert_eq!(selection.source, ScoreSource::DiscoveryOrder);
        assert_eq!(ids(&selection), vec!["a", "b", "c"]);
    }

    #[test_case(f64::NAN, 0.0 ; "nan")]
    #[test_case(f64::INFINITY, 0.0 ; "infinite")]
    #[test_case(1.5, 1.0 ; "above range")]
    #[test_case(-0.5, 0.0 ; "below range")]
    #[test_case(0.25, 0.25 ; "in range")]
    fn sanitize_scores(raw: f64, expected: f64) {
        assert_eq!(sanitize(raw), expected);
    }
}

//! Response ranking.

use std::sync::Arc;
use std::time::Duration;

use bazaar_agent::Deal;
use bazaar_core::{call_with_timeout, AiService, BotId, ServiceRequest};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::selector::sanitize;

/// How a ranking was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Nothing to compare.
    Trivial,
    /// Scored by the AI service.
    Ai,
    /// AI unavailable; arrival order with zero scores.
    Arrival,
}

/// One fulfilled response with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResponse {
    /// 1-based rank.
    pub rank: usize,
    /// Quality score in `[0, 1]`.
    pub score: f64,
    /// 0-based arrival position.
    pub arrival: usize,
    /// The completed negotiation.
    pub deal: Deal,
}

impl RankedResponse {
    /// Provider that produced the response.
    #[must_use]
    pub const fn provider_id(&self) -> &BotId {
        &self.deal.provider_id
    }
}

/// Ranked responses, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Responses in rank order.
    pub responses: Vec<RankedResponse>,
    /// How the order was decided.
    pub source: RankSource,
}

/// Orders fulfilled responses by AI-judged quality.
#[derive(Clone)]
pub struct Ranker {
    ai: Arc<dyn AiService>,
    timeout: Duration,
}

impl Ranker {
    /// Creates a ranker.
    #[must_use]
    pub fn new(ai: Arc<dyn AiService>, timeout: Duration) -> Self {
        Self { ai, timeout }
    }

    /// Ranks `deals`, given in arrival order.
    ///
    /// A single response ranks first with score 1.0 without consulting the
    /// AI. Ties keep arrival order.
    pub async fn rank(&self, request: &ServiceRequest, deals: Vec<Deal>) -> Ranking {
        match deals.len() {
            0 => {
                return Ranking {
                    responses: Vec::new(),
                    source: RankSource::Trivial,
                };
            }
            1 => {
                return Ranking {
                    responses: deals
                        .into_iter()
                        .map(|deal| RankedResponse {
                            rank: 1,
                            score: 1.0,
                            arrival: 0,
                            deal,
                        })
                        .collect(),
                    source: RankSource::Trivial,
                };
            }
            _ => {}
        }

        let payloads: Vec<Value> = deals.iter().map(|d| d.fulfillment.payload.clone()).collect();
        let scored = call_with_timeout(self.timeout, self.ai.rank(request, &payloads)).await;
        let (scores, source) = match scored {
            Ok(scores) if scores.len() == deals.len() => (scores.into_iter().map(sanitize).collect(), RankSource::Ai),
            Ok(scores) => {
                warn!(
                    request_id = %request.request_id(),
                    expected = deals.len(),
                    got = scores.len(),
                    "Ranking had the wrong length, keeping arrival order"
                );
                (vec![0.0; deals.len()], RankSource::Arrival)
            }
            Err(err) => {
                warn!(request_id = %request.request_id(), error = %err, "Ranking failed, keeping arrival order");
                (vec![0.0; deals.len()], RankSource::Arrival)
            }
        };

        let mut responses: Vec<RankedResponse> = deals
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(arrival, (deal, score))| RankedResponse {
                rank: 0,
                score,
                arrival,
                deal,
            })
            .collect();
        responses.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.arrival.cmp(&b.arrival)));
        for (i, response) in responses.iter_mut().enumerate() {
            response.rank = i + 1;
        }
        debug!(request_id = %request.request_id(), responses = responses.len(), source = ?source, "Ranked responses");
        Ranking { responses, source }
    }
}

impl std::fmt::Debug for Ranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranker")
            .field("ai", &self.ai.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAi;
    use bazaar_core::{AiError, Capability, FulfillmentMessage, OfferTerms, Readiness, ServiceId};
    use chrono::Utc;
    use serde_json::json;

    fn make_request() -> ServiceRequest {
        ServiceRequest::new(BotId::from("reader"), Capability::new("ai-news").unwrap())
    }

    fn make_deals(request: &ServiceRequest, providers: &[&str]) -> Vec<Deal> {
        providers
            .iter()
            .map(|p| Deal {
                provider_id: BotId::from(*p),
                terms: OfferTerms {
                    confidence: 0.9,
                    ttl_secs: 300,
                    cached: false,
                    readiness: Readiness::OnDemand,
                },
                fulfillment: FulfillmentMessage {
                    request_id: request.request_id(),
                    service_id: ServiceId::new(),
                    payload: json!({"from": p}),
                    expires_at: None,
                    reused: false,
                    provider_id: None,
                    quality_score: None,
                },
                completed_at: Utc::now(),
            })
            .collect()
    }

    fn order(ranking: &Ranking) -> Vec<&str> {
        ranking.responses.iter().map(|r| r.provider_id().as_str()).collect()
    }

    #[tokio::test]
    async fn no_responses() {
        let ai = Arc::new(ScriptedAi::default());
        let ranker = Ranker::new(ai.clone(), Duration::from_secs(1));
        let ranking = ranker.rank(&make_request(), Vec::new()).await;
        assert!(ranking.responses.is_empty());
        assert_eq!(ai.rank_calls(), 0);
    }

    #[tokio::test]
    async fn single_response_skips_ai() {
        let ai = Arc::new(ScriptedAi::default());
        let ranker = Ranker::new(ai.clone(), Duration::from_secs(1));
        let request = make_request();

        let ranking = ranker.rank(&request, make_deals(&request, &["solo"])).await;
        assert_eq!(ranking.source, RankSource::Trivial);
        assert_eq!(ranking.responses[0].rank, 1);
        assert_eq!(ranking.responses[0].score, 1.0);
        assert_eq!(ai.rank_calls(), 0);
    }

    #[tokio::test]
    async fn sorts_descending_with_arrival_tiebreak() {
        let ai = ScriptedAi::default().with_rank_scores(Ok(vec![0.5, 0.9, f64::NAN, 0.5]));
        let ranker = Ranker::new(Arc::new(ai), Duration::from_secs(1));
        let request = make_request();

        let ranking = ranker.rank(&request, make_deals(&request, &["a", "b", "c", "d"])).await;
        assert_eq!(ranking.source, RankSource::Ai);
        assert_eq!(order(&ranking), vec!["b", "a", "d", "c"]);
        let ranks: Vec<usize> = ranking.responses.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(ranking.responses[3].score, 0.0);
    }

    #[tokio::test]
    async fn failure_degrades_to_arrival_order() {
        let ai = ScriptedAi::default().with_rank_scores(Err(AiError::Unavailable("down".into())));
        let ranker = Ranker::new(Arc::new(ai), Duration::from_secs(1));
        let request = make_request();

        let ranking = ranker.rank(&request, make_deals(&request, &["a", "b", "c"])).await;
        assert_eq!(ranking.source, RankSource::Arrival);
        assert_eq!(order(&ranking), vec!["a", "b", "c"]);
        assert!(ranking.responses.iter().all(|r| r.score == 0.0));
    }

    #[tokio::test]
    async fn length_mismatch_degrades() {
        let ai = ScriptedAi::default().with_rank_scores(Ok(vec![0.9]));
        let ranker = Ranker::new(Arc::new(ai), Duration::from_secs(1));
        let request = make_request();

        let ranking = ranker.rank(&request, make_deals(&request, &["a", "b"])).await;
        assert_eq!(ranking.source, RankSource::Arrival);
        assert_eq!(order(&ranking), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn slow_ranking_degrades() {
        let ai = ScriptedAi::default()
            .with_rank_scores(Ok(vec![0.1, 0.9]))
            .with_delay(Duration::from_millis(500));
        let ranker = Ranker::new(Arc::new(ai), Duration::from_millis(50));
        let request = make_request();

        let ranking = ranker.rank(&request, make_deals(&request, &["a", "b"])).await;
        assert_eq!(ranking.source, RankSource::Arrival);
    }
}

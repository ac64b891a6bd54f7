//! Scripted AI service shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bazaar_core::{AiError, AiService, BotDescriptor, BoxFuture, Capability, Evaluation, Parameters, ServiceRequest};
use serde_json::{json, Value};

pub(crate) struct ScriptedAi {
    enhance: Result<Value, AiError>,
    candidate_scores: Result<Vec<f64>, AiError>,
    rank_scores: Result<Vec<f64>, AiError>,
    rank_by_quality: bool,
    delay: Duration,
    rank_calls: AtomicU32,
}

impl Default for ScriptedAi {
    fn default() -> Self {
        Self {
            enhance: Ok(json!({})),
            candidate_scores: Err(AiError::Unavailable("no scores scripted".into())),
            rank_scores: Err(AiError::Unavailable("no ranking scripted".into())),
            rank_by_quality: false,
            delay: Duration::ZERO,
            rank_calls: AtomicU32::new(0),
        }
    }
}

impl ScriptedAi {
    pub(crate) fn with_enhance(mut self, output: Result<Value, AiError>) -> Self {
        self.enhance = output;
        self
    }

    pub(crate) fn with_candidate_scores(mut self, scores: Result<Vec<f64>, AiError>) -> Self {
        self.candidate_scores = scores;
        self
    }

    pub(crate) fn with_rank_scores(mut self, scores: Result<Vec<f64>, AiError>) -> Self {
        self.rank_scores = scores;
        self
    }

    /// Ranks each payload by its numeric `quality` field.
    pub(crate) fn ranking_by_quality(mut self) -> Self {
        self.rank_by_quality = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn rank_calls(&self) -> u32 {
        self.rank_calls.load(Ordering::SeqCst)
    }
}

impl AiService for ScriptedAi {
    fn evaluate<'a>(
        &'a self,
        _capability: &'a Capability,
        _parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Evaluation, AiError>> {
        Box::pin(async { Ok(Evaluation::new(true, 1.0)) })
    }

    fn generate<'a>(
        &'a self,
        _capability: &'a Capability,
        _parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async { Ok(json!({})) })
    }

    fn enhance<'a>(&'a self, _request: &'a ServiceRequest) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.enhance.clone()
        })
    }

    fn rank<'a>(
        &'a self,
        _request: &'a ServiceRequest,
        payloads: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move {
            self.rank_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.rank_by_quality {
                return Ok(payloads.iter().map(|p| p["quality"].as_f64().unwrap_or(0.0)).collect());
            }
            self.rank_scores.clone()
        })
    }

    fn score_candidates<'a>(
        &'a self,
        _request: &'a ServiceRequest,
        _candidates: &'a [BotDescriptor],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.candidate_scores.clone()
        })
    }
}

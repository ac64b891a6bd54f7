//! The external AI reasoning capability.
//!
//! Bots never talk to a model directly; they hold an `Arc<dyn AiService>` and
//! wrap every call in [`call_with_timeout`]. Implementations live outside this
//! crate (an offline heuristic backend and a remote chat-completions client).

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capability;
use crate::error::AiError;
use crate::types::{BotDescriptor, Parameters, ServiceRequest};
use crate::BoxFuture;

/// A provider's assessment of whether it can serve a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the request can be fulfilled.
    pub can_fulfill: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Optional explanation from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Evaluation {
    /// Creates an evaluation, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(can_fulfill: bool, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            can_fulfill,
            confidence,
            reasoning: None,
        }
    }

    /// A negative evaluation with zero confidence.
    #[must_use]
    pub fn decline() -> Self {
        Self::new(false, 0.0)
    }

    /// Attaches reasoning text.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Returns true if the request can be fulfilled with at least `min` confidence.
    #[must_use]
    pub fn passes(&self, min: f64) -> bool {
        self.can_fulfill && self.confidence >= min
    }
}

/// AI reasoning operations used across the marketplace.
pub trait AiService: Send + Sync {
    /// Decides whether a capability and parameter set can be served.
    fn evaluate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Evaluation, AiError>>;

    /// Produces a service payload.
    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Value, AiError>>;

    /// Suggests additional or refined parameters for a request.
    ///
    /// Callers expect a JSON object; anything else is treated as no enhancement.
    fn enhance<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Result<Value, AiError>>;

    /// Scores competing payloads for one request, one score per payload.
    fn rank<'a>(
        &'a self,
        request: &'a ServiceRequest,
        payloads: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>>;

    /// Scores candidate providers for one request, one score per candidate.
    fn score_candidates<'a>(
        &'a self,
        request: &'a ServiceRequest,
        candidates: &'a [BotDescriptor],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>>;

    /// Backend name, for logs.
    fn name(&self) -> &str {
        "ai"
    }
}

/// Awaits an AI call, failing with [`AiError::Timeout`] after `limit`.
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AiError>
where
    F: Future<Output = Result<T, AiError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(limit)),
    }
}

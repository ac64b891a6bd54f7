//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use bazaar_core::{AiError, AiService, BotDescriptor, BoxFuture, Capability, Evaluation, Parameters, ServiceRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AiSettings;

const SYSTEM_PROMPT: &str = "You are the reasoning engine of a bot marketplace. \
    Always respond with a single valid JSON object and nothing else.";
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct EvaluationReply {
    can_fulfill: bool,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoresReply {
    scores: Vec<f64>,
}

/// [`AiService`] backed by a chat-completions HTTP API.
pub struct ChatCompletionsAi {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsAi {
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(settings: &AiSettings, api_key: impl Into<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| AiError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: String) -> Result<Value, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, "Chat completion failed");
            return Err(AiError::Unavailable(format!("{status}: {body}")));
        }

        let reply = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::Malformed("no choices in reply".to_string()))?;
        debug!(model = %self.model, chars = content.len(), "Chat completion received");
        extract_json(&content)
    }

    async fn scores(&self, prompt: String, expected: usize) -> Result<Vec<f64>, AiError> {
        let value = self.complete(prompt).await?;
        let reply: ScoresReply = serde_json::from_value(value).map_err(|e| AiError::Malformed(e.to_string()))?;
        if reply.scores.len() != expected {
            return Err(AiError::Malformed(format!(
                "expected {expected} scores, got {}",
                reply.scores.len()
            )));
        }
        Ok(reply.scores)
    }
}

impl std::fmt::Debug for ChatCompletionsAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsAi")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl AiService for ChatCompletionsAi {
    fn evaluate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Evaluation, AiError>> {
        Box::pin(async move {
            let prompt = format!(
                "Can a provider for capability '{capability}' fulfill a request with these parameters?\n{}\n\
                 Respond with {{\"can_fulfill\": bool, \"confidence\": number between 0 and 1, \"reasoning\": string}}.",
                Value::Object(parameters.clone())
            );
            let value = self.complete(prompt).await?;
            let reply: EvaluationReply =
                serde_json::from_value(value).map_err(|e| AiError::Malformed(e.to_string()))?;
            let evaluation = Evaluation::new(reply.can_fulfill, reply.confidence);
            Ok(match reply.reasoning {
                Some(reasoning) => evaluation.with_reasoning(reasoning),
                None => evaluation,
            })
        })
    }

    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move {
            let prompt = format!(
                "Generate current, detailed data for the capability '{capability}' using these parameters:\n{}",
                Value::Object(parameters.clone())
            );
            self.complete(prompt).await
        })
    }

    fn enhance<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Result<Value, AiError>> {
        Box::pin(async move {
            let prompt = format!(
                "Refine the parameters of this '{}' request so providers can serve it better. \
                 Keep existing keys unless they need normalizing. Description: {}\nParameters:\n{}\n\
                 Respond with the refined parameters as a JSON object.",
                request.capability(),
                request.description().unwrap_or("none"),
                Value::Object(request.parameters().clone())
            );
            self.complete(prompt).await
        })
    }

    fn rank<'a>(
        &'a self,
        request: &'a ServiceRequest,
        payloads: &'a [Value],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move {
            let prompt = format!(
                "Score each response to a '{}' request for quality and relevance, from 0 to 1.\n\
                 Request parameters:\n{}\nResponses:\n{}\n\
                 Respond with {{\"scores\": [number, ...]}}, one score per response in order.",
                request.capability(),
                Value::Object(request.effective_parameters().clone()),
                Value::Array(payloads.to_vec())
            );
            self.scores(prompt, payloads.len()).await
        })
    }

    fn score_candidates<'a>(
        &'a self,
        request: &'a ServiceRequest,
        candidates: &'a [BotDescriptor],
    ) -> BoxFuture<'a, Result<Vec<f64>, AiError>> {
        Box::pin(async move {
            let summaries: Vec<Value> = candidates
                .iter()
                .map(|c| {
                    json!({
                        "bot_id": c.bot_id,
                        "name": c.name,
                        "description": c.description,
                        "capabilities": c.capabilities,
                    })
                })
                .collect();
            let prompt = format!(
                "Score how well each provider suits a '{}' request, from 0 to 1.\n\
                 Request parameters:\n{}\nProviders:\n{}\n\
                 Respond with {{\"scores\": [number, ...]}}, one score per provider in order.",
                request.capability(),
                Value::Object(request.effective_parameters().clone()),
                Value::Array(summaries)
            );
            self.scores(prompt, candidates.len()).await
        })
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

/// Pulls a JSON value out of model output that may wrap it in markdown
/// fences or surrounding prose.
///
/// # Errors
///
/// Returns [`AiError::Malformed`] if no JSON can be parsed.
pub fn extract_json(text: &str) -> Result<Value, AiError> {
    let mut candidate = text.trim();
    if let Some((_, rest)) = candidate.split_once("```json") {
        candidate = rest.split("```").next().unwrap_or(rest).trim();
    } else if let Some((_, rest)) = candidate.split_once("```") {
        candidate = rest.split("```").next().unwrap_or(rest).trim();
    }
    if !candidate.starts_with('{') {
        if let Some(start) = candidate.find('{') {
            candidate = &candidate[start..];
        }
    }
    if let Ok(value) = serde_json::from_str(candidate) {
        return Ok(value);
    }
    // Trailing prose after the object.
    if let Some(end) = candidate.rfind('}') {
        if let Ok(value) = serde_json::from_str(&candidate[..=end]) {
            return Ok(value);
        }
    }
    Err(AiError::Malformed(format!(
        "no JSON object in model output ({} chars)",
        text.len()
    )))
}

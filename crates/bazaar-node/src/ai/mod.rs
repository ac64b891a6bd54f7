//! AI backends.

pub mod heuristic;
pub mod remote;

use std::sync::Arc;

use bazaar_core::AiService;
use tracing::info;

pub use heuristic::HeuristicAi;
pub use remote::{extract_json, ChatCompletionsAi};

use crate::config::{AiBackend, MarketConfig};
use crate::error::ConfigError;

/// Builds the configured AI backend.
///
/// # Errors
///
/// Returns an error if the remote backend has no credentials or its client
/// cannot be built.
pub fn build_ai(config: &MarketConfig) -> Result<Arc<dyn AiService>, ConfigError> {
    let ai: Arc<dyn AiService> = match config.ai.backend {
        AiBackend::Heuristic => Arc::new(HeuristicAi::new()),
        AiBackend::Remote => {
            let key = config
                .resolve_credentials()?
                .ok_or_else(|| ConfigError::MissingCredentials {
                    env_var: config.ai.api_key_env.clone(),
                })?;
            let client = ChatCompletionsAi::new(&config.ai, key).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Arc::new(client)
        }
    };
    info!(backend = ai.name(), "AI backend ready");
    Ok(ai)
}

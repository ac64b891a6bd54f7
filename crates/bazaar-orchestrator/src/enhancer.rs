//! Request enhancement.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{call_with_timeout, AiService, ServiceRequest};
use serde_json::Value;
use tracing::{debug, warn};

/// The request that will be sent to providers.
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    /// Enhanced request, or a copy of the original on fallback.
    pub request: ServiceRequest,
    /// Whether enhancement succeeded.
    pub enhanced: bool,
}

/// Overlays AI-suggested parameters onto requests.
#[derive(Clone)]
pub struct Enhancer {
    ai: Arc<dyn AiService>,
    timeout: Duration,
}

impl Enhancer {
    /// Creates an enhancer.
    #[must_use]
    pub fn new(ai: Arc<dyn AiService>, timeout: Duration) -> Self {
        Self { ai, timeout }
    }

    /// Enhances `request`.
    ///
    /// The AI output must be a JSON object; its keys are laid over the
    /// original parameters. Any failure passes the original through
    /// unchanged.
    pub async fn enhance(&self, request: &ServiceRequest) -> Enhancement {
        let request_id = request.request_id();
        let output = call_with_timeout(self.timeout, self.ai.enhance(request)).await;
        let overlay = match output {
            Ok(Value::Object(overlay)) => overlay,
            Ok(other) => {
                warn!(request_id = %request_id, kind = json_kind(&other), "Enhancement was not an object, passing through");
                return passthrough(request);
            }
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "Enhancement failed, passing through");
                return passthrough(request);
            }
        };

        let mut parameters = request.parameters().clone();
        let added = overlay.len();
        parameters.extend(overlay);
        debug!(request_id = %request_id, added, "Enhanced request");
        Enhancement {
            request: request.with_enhancement(parameters),
            enhanced: true,
        }
    }
}

impl std::fmt::Debug for Enhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enhancer")
            .field("ai", &self.ai.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn passthrough(request: &ServiceRequest) -> Enhancement {
    Enhancement {
        request: request.clone(),
        enhanced: false,
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Message transport between bots.
//!
//! [`Transport`] moves one [`Message`] to an endpoint and returns the reply.
//! [`LocalTransport`] routes by endpoint string to in-process handlers and
//! pushes every message through JSON, so the wire contract holds even when a
//! whole market runs inside one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::protocol::Message;
use crate::BoxFuture;

/// Something that answers messages: a mediator, provider, or orchestrator.
pub trait MessageHandler: Send + Sync {
    /// Handles one message and returns the reply.
    fn handle(&self, message: Message) -> BoxFuture<'_, Message>;
}

/// Request/reply channel to other bots.
pub trait Transport: Send + Sync {
    /// Sends a message to `endpoint` and waits for the reply.
    fn send<'a>(&'a self, endpoint: &'a str, message: Message) -> BoxFuture<'a, Result<Message, TransportError>>;
}

/// Sends a message, failing with [`TransportError::Timeout`] after `limit`.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    endpoint: &str,
    message: Message,
    limit: Duration,
) -> Result<Message, TransportError> {
    match tokio::time::timeout(limit, transport.send(endpoint, message)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            endpoint: endpoint.to_string(),
            timeout: limit,
        }),
    }
}

/// In-process transport keyed by endpoint string.
#[derive(Default)]
pub struct LocalTransport {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl LocalTransport {
    /// Creates a transport with no endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to an endpoint, replacing any previous binding.
    pub fn bind(&self, endpoint: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let endpoint = endpoint.into();
        debug!(endpoint = %endpoint, "Bound local endpoint");
        self.handlers.write().insert(endpoint, handler);
    }

    /// Removes a binding. Returns true if one existed.
    pub fn unbind(&self, endpoint: &str) -> bool {
        self.handlers.write().remove(endpoint).is_some()
    }

    /// Returns true if the endpoint is bound.
    #[must_use]
    pub fn is_bound(&self, endpoint: &str) -> bool {
        self.handlers.read().contains_key(endpoint)
    }

    /// Lists bound endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.handlers.read().keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Drops every binding.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    fn through_json(message: &Message) -> Result<Message, TransportError> {
        let text = serde_json::to_string(message).map_err(|e| TransportError::Codec(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| TransportError::Codec(e.to_string()))
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("endpoints", &self.endpoints())
            .finish()
    }
}

impl Transport for LocalTransport {
    fn send<'a>(&'a self, endpoint: &'a str, message: Message) -> BoxFuture<'a, Result<Message, TransportError>> {
        Box::pin(async move {
            let handler = self
                .handlers
                .read()
                .get(endpoint)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(endpoint.to_string()))?;

            let inbound = Self::through_json(&message)?;
            trace!(endpoint = %endpoint, kind = inbound.kind(), "Delivering message");
            let reply = handler.handle(inbound).await;
            Self::through_json(&reply)
        })
    }
}

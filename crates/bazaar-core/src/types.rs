//! Core data model shared by every bot role.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::capability::Capability;
use crate::fingerprint::Fingerprint;

/// Free-form request payload: string keys mapped to scalar or nested values.
pub type Parameters = serde_json::Map<String, Value>;

/// Stable identifier of a bot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(String);

impl BotId {
    /// Creates a bot ID from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random bot ID with the given prefix.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BotId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique identifier for a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a request ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a service endpoint created by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Creates a new unique service ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a bot plays in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BotRole {
    /// Asks for services.
    #[default]
    Requestor,
    /// Fulfills services.
    Provider,
    /// Enhances, routes, and ranks on behalf of requestors.
    Orchestrator,
    /// Both requests and provides.
    Hybrid,
}

impl BotRole {
    /// Returns true if bots of this role accept service requests.
    #[must_use]
    pub const fn provides(&self) -> bool {
        matches!(self, Self::Provider | Self::Hybrid)
    }
}

impl fmt::Display for BotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requestor => write!(f, "requestor"),
            Self::Provider => write!(f, "provider"),
            Self::Orchestrator => write!(f, "orchestrator"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// What a bot advertises about itself to the mediator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotDescriptor {
    /// Unique, stable bot identifier.
    pub bot_id: BotId,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Role in the marketplace.
    pub role: BotRole,
    /// Capability tags this bot can serve.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Address used to reach the bot through a transport.
    pub endpoint: String,
    /// Free-text description, used by AI provider scoring.
    #[serde(default)]
    pub description: String,
    /// When the descriptor was created or last registered.
    pub registered_at: DateTime<Utc>,
}

impl BotDescriptor {
    /// Creates a descriptor with no capabilities.
    #[must_use]
    pub fn new(bot_id: impl Into<BotId>, role: BotRole, endpoint: impl Into<String>) -> Self {
        let bot_id = bot_id.into();
        Self {
            name: bot_id.to_string(),
            bot_id,
            role,
            capabilities: BTreeSet::new(),
            endpoint: endpoint.into(),
            description: String::new(),
            registered_at: Utc::now(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Adds several capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// Returns true if the bot advertises exactly this capability.
    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A request for a service, composed by a requestor.
///
/// The identity fields are private: enhancement derives a new request via
/// [`ServiceRequest::with_enhancement`] and never edits `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    request_id: RequestId,
    requester_id: BotId,
    capability: Capability,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enhanced_parameters: Option<Parameters>,
}

impl ServiceRequest {
    /// Creates a request with a fresh ID and empty parameters.
    #[must_use]
    pub fn new(requester_id: BotId, capability: Capability) -> Self {
        Self {
            request_id: RequestId::new(),
            requester_id,
            capability,
            parameters: Parameters::new(),
            description: None,
            created_at: Utc::now(),
            enhanced_parameters: None,
        }
    }

    /// Replaces the parameters wholesale (builder step, before sending).
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets one parameter (builder step, before sending).
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Attaches a free-text description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Derives an enhanced copy of this request.
    ///
    /// The copy keeps the same `request_id`, `capability`, and `parameters`.
    #[must_use]
    pub fn with_enhancement(&self, enhanced: Parameters) -> Self {
        Self {
            enhanced_parameters: Some(enhanced),
            ..self.clone()
        }
    }

    /// Derives a copy addressed from a different requester, as done by an
    /// orchestrator forwarding on behalf of a requestor.
    #[must_use]
    pub fn forwarded_by(&self, requester_id: BotId) -> Self {
        Self {
            requester_id,
            ..self.clone()
        }
    }

    /// Request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Requesting bot.
    #[must_use]
    pub const fn requester_id(&self) -> &BotId {
        &self.requester_id
    }

    /// Requested capability.
    #[must_use]
    pub const fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Original parameters as composed by the requestor.
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Enhanced parameters, if an orchestrator added them.
    #[must_use]
    pub const fn enhanced_parameters(&self) -> Option<&Parameters> {
        self.enhanced_parameters.as_ref()
    }

    /// Parameters a provider should act on: enhanced if present, else original.
    #[must_use]
    pub fn effective_parameters(&self) -> &Parameters {
        self.enhanced_parameters.as_ref().unwrap_or(&self.parameters)
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if the request carries enhanced parameters.
    #[must_use]
    pub const fn is_enhanced(&self) -> bool {
        self.enhanced_parameters.is_some()
    }
}

/// Final outcome of a negotiation, as reported to the mediator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The request was fulfilled.
    Fulfilled,
    /// The provider or requestor rejected the request.
    Rejected,
    /// A peer did not answer in time or the negotiation was abandoned.
    Expired,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Append-only log entry sent to the mediator after a negotiation closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationEvent {
    /// Request the negotiation was about.
    pub request_id: RequestId,
    /// Provider that was negotiated with.
    pub provider_id: BotId,
    /// How the negotiation ended.
    pub outcome: Outcome,
    /// When the outcome was reached.
    pub timestamp: DateTime<Utc>,
    /// Optional free-text detail (e.g. a rejection reason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NegotiationEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(request_id: RequestId, provider_id: BotId, outcome: Outcome) -> Self {
        Self {
            request_id,
            provider_id,
            outcome,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    /// Attaches a detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A service endpoint a provider announced to the mediator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceListing {
    /// Provider-assigned service ID.
    pub service_id: ServiceId,
    /// Provider that serves it.
    pub provider_id: BotId,
    /// Capability it was created for.
    pub capability: Capability,
    /// Dedup key of the request that created it.
    pub fingerprint: Fingerprint,
    /// When the listing stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl ServiceListing {
    /// Returns true if the listing is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cap(tag: &str) -> Capability {
        Capability::new(tag).unwrap()
    }

    #[test]
    fn bot_id_generate_is_prefixed_and_unique() {
        let a = BotId::generate("provider");
        let b = BotId::generate("provider");
        assert!(a.as_str().starts_with("provider-"));
        assert_ne!(a, b);
        assert!(!a.is_blank());
        assert!(BotId::from("  ").is_blank());
    }

    #[test]
    fn descriptor_builder_collects_capabilities() {
        let descriptor = BotDescriptor::new("news-bot", BotRole::Provider, "local://news")
            .with_name("News Bot")
            .with_capability(cap("ai-news"))
            .with_capabilities([cap("finance"), cap("ai-news")]);

        assert_eq!(descriptor.name, "News Bot");
        assert_eq!(descriptor.capabilities.len(), 2);
        assert!(descriptor.has_capability(&cap("finance")));
        assert!(!descriptor.has_capability(&cap("weather")));
    }

    #[test]
    fn role_provides() {
        assert!(BotRole::Provider.provides());
        assert!(BotRole::Hybrid.provides());
        assert!(!BotRole::Requestor.provides());
        assert!(!BotRole::Orchestrator.provides());
    }

    #[test]
    fn enhancement_derives_without_touching_original() {
        let original = ServiceRequest::new(BotId::from("r"), cap("ai-news"))
            .with_parameter("topic", json!("AI trends"));

        let mut extra = original.parameters().clone();
        extra.insert("region".into(), json!("global"));
        let enhanced = original.with_enhancement(extra);

        assert_eq!(enhanced.request_id(), original.request_id());
        assert_eq!(enhanced.capability(), original.capability());
        assert_eq!(enhanced.parameters(), original.parameters());
        assert!(enhanced.is_enhanced());
        assert!(!original.is_enhanced());
        assert_eq!(enhanced.effective_parameters().get("region"), Some(&json!("global")));
        assert_eq!(original.effective_parameters().get("region"), None);
    }

    #[test]
    fn forwarded_request_keeps_identity() {
        let original = ServiceRequest::new(BotId::from("r"), cap("finance"));
        let forwarded = original.forwarded_by(BotId::from("orchestrator"));
        assert_eq!(forwarded.request_id(), original.request_id());
        assert_eq!(forwarded.requester_id().as_str(), "orchestrator");
    }

    #[test]
    fn request_json_omits_absent_optionals() {
        let request = ServiceRequest::new(BotId::from("r"), cap("finance"))
            .with_parameter("symbol", json!("AAPL"));
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("enhanced_parameters").is_none());
        assert!(value.get("description").is_none());
        assert_eq!(value["capability"], json!("finance"));
        assert_eq!(value["parameters"]["symbol"], json!("AAPL"));
    }

    #[test]
    fn listing_expiry_is_strict() {
        let now = Utc::now();
        let listing = ServiceListing {
            service_id: ServiceId::new(),
            provider_id: BotId::from("p"),
            capability: cap("finance"),
            fingerprint: Fingerprint::compute(&cap("finance"), &Parameters::new()),
            expires_at: now,
        };
        assert!(!listing.is_expired(now));
        assert!(listing.is_expired(now + chrono::Duration::milliseconds(1)));
    }
}

//! Node configuration.
//!
//! Configuration for a Bazaar marketplace node, including:
//! - The capability allow-list
//! - Mediator endpoint
//! - Provider cache and maintenance settings
//! - Negotiation timeouts
//! - Orchestrator selection settings
//! - AI backend selection and credentials
//! - Logging

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use bazaar_agent::{NegotiationTimeouts, ProviderConfig};
use bazaar_cache::{CacheConfig, FreshnessPolicy};
use bazaar_core::{Capability, CapabilityCatalog};
use bazaar_orchestrator::{OrchestratorConfig, SelectionMode};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding `logging.filter`.
pub const ENV_LOG: &str = "BAZAAR_LOG";
/// Environment variable overriding `ai.backend`.
pub const ENV_AI_BACKEND: &str = "BAZAAR_AI_BACKEND";

/// Where the mediator listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MediatorSettings {
    /// Mediator endpoint address.
    pub endpoint: String,
    /// Bound on one mediator round trip, in milliseconds.
    pub timeout_ms: u64,
    /// Period of the expired-listing sweep, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for MediatorSettings {
    fn default() -> Self {
        Self {
            endpoint: "local://mediator".to_string(),
            timeout_ms: 5_000,
            sweep_interval_secs: 60,
        }
    }
}

/// Freshness policy as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessSetting {
    /// Serve cached payloads as-is.
    #[default]
    Never,
    /// Regenerate on every hit.
    Always,
    /// Regenerate payloads older than this many seconds.
    OlderThanSecs(u64),
}

impl From<FreshnessSetting> for FreshnessPolicy {
    fn from(setting: FreshnessSetting) -> Self {
        match setting {
            FreshnessSetting::Never => Self::Never,
            FreshnessSetting::Always => Self::Always,
            FreshnessSetting::OlderThanSecs(secs) => Self::OlderThan(Duration::from_secs(secs)),
        }
    }
}

/// Provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Lifetime of a cached service endpoint, in seconds.
    pub ttl_secs: u64,
    /// Period of the cache and negotiation sweep, in seconds.
    pub sweep_interval_secs: u64,
    /// Minimum AI confidence required to make an offer.
    pub min_confidence: f64,
    /// Bound on the AI evaluation call, in milliseconds.
    pub evaluate_timeout_ms: u64,
    /// Bound on payload generation, in milliseconds.
    pub generate_timeout_ms: u64,
    /// Default freshness policy for cache hits.
    pub freshness: FreshnessSetting,
    /// Per-capability freshness policies.
    pub freshness_overrides: BTreeMap<String, FreshnessSetting>,
    /// Open negotiations older than this are expired, in seconds.
    pub negotiation_deadline_secs: u64,
    /// Closed negotiations are kept this long, in seconds.
    pub negotiation_grace_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            sweep_interval_secs: 300,
            min_confidence: 0.5,
            evaluate_timeout_ms: 5_000,
            generate_timeout_ms: 10_000,
            freshness: FreshnessSetting::Never,
            freshness_overrides: BTreeMap::new(),
            negotiation_deadline_secs: 120,
            negotiation_grace_secs: 600,
        }
    }
}

/// Negotiation stage bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NegotiationSettings {
    /// Wait for an offer, in milliseconds.
    pub offer_timeout_ms: u64,
    /// Wait for a fulfillment, in milliseconds.
    pub fulfillment_timeout_ms: u64,
    /// Bound on outcome reports, in milliseconds.
    pub report_timeout_ms: u64,
    /// Wait for an offer from an orchestrator, in milliseconds. Defaults to
    /// [`MarketConfig::proxy_offer_floor`] and may not be set below it.
    pub proxy_offer_timeout_ms: Option<u64>,
    /// Period of the requestor record sweep, in seconds.
    pub sweep_interval_secs: u64,
    /// Closed requestor records are kept this long, in seconds.
    pub grace_secs: u64,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            offer_timeout_ms: 20_000,
            fulfillment_timeout_ms: 30_000,
            report_timeout_ms: 2_000,
            proxy_offer_timeout_ms: None,
            sweep_interval_secs: 300,
            grace_secs: 600,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// `sequential` or `fan_out`.
    pub mode: SelectionMode,
    /// Fan-out score floor.
    pub min_confidence: f64,
    /// Sequential mode tries at most this many providers.
    pub max_attempts: usize,
    /// Fan-out negotiates with at most this many providers.
    pub fan_out_limit: Option<usize>,
    /// Bound on each AI call, in milliseconds.
    pub ai_timeout_ms: u64,
    /// Orchestrated requests kept in history.
    pub history_limit: usize,
    /// How long a proxied result waits for acceptance, in seconds.
    pub pending_ttl_secs: u64,
    /// Period of the orchestrator sweep, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            mode: defaults.mode,
            min_confidence: defaults.min_confidence,
            max_attempts: defaults.max_attempts,
            fan_out_limit: defaults.fan_out_limit,
            ai_timeout_ms: defaults.ai_timeout.as_millis() as u64,
            history_limit: defaults.history_limit,
            pending_ttl_secs: defaults.pending_ttl.as_secs(),
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
        }
    }
}

/// Which AI service backs the bots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiBackend {
    /// Offline heuristics with demo data.
    #[default]
    Heuristic,
    /// An OpenAI-compatible chat-completions endpoint.
    Remote,
}

impl std::str::FromStr for AiBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "remote" => Ok(Self::Remote),
            other => Err(ConfigError::Invalid(format!("unknown AI backend '{other}'"))),
        }
    }
}

/// AI backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AiSettings {
    /// Backend selection.
    pub backend: AiBackend,
    /// Base URL of the chat-completions API.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Bound on one HTTP request, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            backend: AiBackend::Heuristic,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_ms: 20_000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MarketConfig {
    /// Capability allow-list. Empty accepts every well-formed tag.
    pub capabilities: Vec<String>,
    /// Mediator settings.
    pub mediator: MediatorSettings,
    /// Provider settings.
    pub provider: ProviderSettings,
    /// Negotiation settings.
    pub negotiation: NegotiationSettings,
    /// Orchestrator settings.
    pub orchestrator: OrchestratorSettings,
    /// AI backend settings.
    pub ai: AiSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl MarketConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `BAZAAR_LOG` and `BAZAAR_AI_BACKEND` from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `BAZAAR_AI_BACKEND` names an unknown backend.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend override is unknown.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            self.logging.filter = filter;
        }
        if let Some(backend) = lookup(ENV_AI_BACKEND) {
            self.ai.backend = backend.parse()?;
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let catalog = self.catalog()?;
        for tag in self.provider.freshness_overrides.keys() {
            catalog.parse(tag)?;
        }

        if self.mediator.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("mediator.endpoint cannot be empty".to_string()));
        }
        if self.provider.ttl_secs == 0 {
            return Err(ConfigError::Invalid("provider.ttl_secs must be greater than 0".to_string()));
        }
        let intervals = [
            ("mediator.sweep_interval_secs", self.mediator.sweep_interval_secs),
            ("provider.sweep_interval_secs", self.provider.sweep_interval_secs),
            ("negotiation.sweep_interval_secs", self.negotiation.sweep_interval_secs),
            ("orchestrator.sweep_interval_secs", self.orchestrator.sweep_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        check_unit("provider.min_confidence", self.provider.min_confidence)?;
        check_unit("orchestrator.min_confidence", self.orchestrator.min_confidence)?;

        let timeouts = [
            ("mediator.timeout_ms", self.mediator.timeout_ms),
            ("provider.evaluate_timeout_ms", self.provider.evaluate_timeout_ms),
            ("provider.generate_timeout_ms", self.provider.generate_timeout_ms),
            ("negotiation.offer_timeout_ms", self.negotiation.offer_timeout_ms),
            ("negotiation.fulfillment_timeout_ms", self.negotiation.fulfillment_timeout_ms),
            ("negotiation.report_timeout_ms", self.negotiation.report_timeout_ms),
            ("orchestrator.ai_timeout_ms", self.orchestrator.ai_timeout_ms),
            ("ai.request_timeout_ms", self.ai.request_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.orchestrator.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.orchestrator.fan_out_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "orchestrator.fan_out_limit must be greater than 0 when set".to_string(),
            ));
        }
        if self.orchestrator.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.history_limit must be greater than 0".to_string(),
            ));
        }

        if let Some(proxy_offer_ms) = self.negotiation.proxy_offer_timeout_ms {
            let floor = self.proxy_offer_floor();
            if Duration::from_millis(proxy_offer_ms) < floor {
                return Err(ConfigError::Invalid(format!(
                    "negotiation.proxy_offer_timeout_ms must be at least {} to cover the orchestrator pipeline",
                    floor.as_millis()
                )));
            }
        }

        if self.ai.backend == AiBackend::Remote {
            if !self.ai.endpoint.starts_with("http://") && !self.ai.endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(
                    "ai.endpoint must start with http:// or https://".to_string(),
                ));
            }
            if self.ai.model.trim().is_empty() {
                return Err(ConfigError::Invalid("ai.model cannot be empty".to_string()));
            }
            if self.ai.api_key_env.trim().is_empty() {
                return Err(ConfigError::Invalid("ai.api_key_env cannot be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Resolves the API key for the remote backend from the process
    /// environment. The heuristic backend needs none.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] if the remote backend is
    /// selected and its key variable is unset or empty.
    pub fn resolve_credentials(&self) -> Result<Option<String>, ConfigError> {
        self.resolve_credentials_with(|key| std::env::var(key).ok())
    }

    /// Like [`MarketConfig::resolve_credentials`] with an explicit lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] if the key is missing.
    pub fn resolve_credentials_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>, ConfigError> {
        match self.ai.backend {
            AiBackend::Heuristic => Ok(None),
            AiBackend::Remote => lookup(&self.ai.api_key_env)
                .filter(|key| !key.trim().is_empty())
                .map(Some)
                .ok_or_else(|| ConfigError::MissingCredentials {
                    env_var: self.ai.api_key_env.clone(),
                }),
        }
    }

    /// The capability allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if a listed tag is malformed.
    pub fn catalog(&self) -> Result<CapabilityCatalog, ConfigError> {
        if self.capabilities.is_empty() {
            return Ok(CapabilityCatalog::open());
        }
        Ok(CapabilityCatalog::from_tags(&self.capabilities)?)
    }

    /// Service cache settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an override names a malformed capability.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let mut config = CacheConfig::default()
            .with_ttl(Duration::from_secs(self.provider.ttl_secs))
            .with_generate_timeout(Duration::from_millis(self.provider.generate_timeout_ms))
            .with_freshness(self.provider.freshness.into());
        for (tag, setting) in &self.provider.freshness_overrides {
            config = config.with_override(Capability::new(tag)?, (*setting).into());
        }
        Ok(config)
    }

    /// Provider bot settings.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            min_confidence: self.provider.min_confidence,
            evaluate_timeout: Duration::from_millis(self.provider.evaluate_timeout_ms),
            negotiation_deadline: Duration::from_secs(self.provider.negotiation_deadline_secs),
            negotiation_grace: Duration::from_secs(self.provider.negotiation_grace_secs),
            sweep_interval: Duration::from_secs(self.provider.sweep_interval_secs),
        }
    }

    /// Negotiation stage bounds.
    pub fn negotiation_timeouts(&self) -> NegotiationTimeouts {
        let proxy_offer = self
            .negotiation
            .proxy_offer_timeout_ms
            .map_or_else(|| self.proxy_offer_floor(), Duration::from_millis);
        NegotiationTimeouts {
            proxy_offer,
            ..self.provider_negotiation_timeouts()
        }
    }

    /// Shortest wait for a proxied offer that covers the orchestrator's
    /// discovery round trip and its whole pipeline.
    pub fn proxy_offer_floor(&self) -> Duration {
        let timeouts = self.provider_negotiation_timeouts();
        Duration::from_millis(self.mediator.timeout_ms) + self.orchestrator_config().proxy_offer_bound(&timeouts)
    }

    /// Requestor maintenance period and closed-record retention.
    pub fn requestor_retention(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.negotiation.sweep_interval_secs),
            Duration::from_secs(self.negotiation.grace_secs),
        )
    }

    fn provider_negotiation_timeouts(&self) -> NegotiationTimeouts {
        let offer = Duration::from_millis(self.negotiation.offer_timeout_ms);
        NegotiationTimeouts {
            offer,
            fulfillment: Duration::from_millis(self.negotiation.fulfillment_timeout_ms),
            report: Duration::from_millis(self.negotiation.report_timeout_ms),
            proxy_offer: offer,
        }
    }

    /// Orchestrator settings.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            mode: self.orchestrator.mode,
            min_confidence: self.orchestrator.min_confidence,
            max_attempts: self.orchestrator.max_attempts,
            fan_out_limit: self.orchestrator.fan_out_limit,
            ai_timeout: Duration::from_millis(self.orchestrator.ai_timeout_ms),
            history_limit: self.orchestrator.history_limit,
            pending_ttl: Duration::from_secs(self.orchestrator.pending_ttl_secs),
            sweep_interval: Duration::from_secs(self.orchestrator.sweep_interval_secs),
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be between 0 and 1")))
    }
}

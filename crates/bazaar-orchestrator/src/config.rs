//! Orchestrator settings.

use std::time::Duration;

use bazaar_agent::NegotiationTimeouts;
use serde::{Deserialize, Serialize};

/// Default score a candidate needs to be included in a fan-out.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// How selected providers are negotiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Try candidates one at a time, best first, until one fulfills.
    #[default]
    Sequential,
    /// Negotiate with every qualifying candidate concurrently.
    FanOut,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::FanOut => write!(f, "fan_out"),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Negotiation mode.
    pub mode: SelectionMode,
    /// Fan-out score floor.
    pub min_confidence: f64,
    /// Sequential mode tries at most this many candidates.
    pub max_attempts: usize,
    /// Fan-out negotiates with at most this many candidates.
    pub fan_out_limit: Option<usize>,
    /// Bound on each AI call (enhance, score, rank).
    pub ai_timeout: Duration,
    /// Number of requests kept in history.
    pub history_limit: usize,
    /// How long a proxied result waits for the requestor's decision.
    pub pending_ttl: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Sequential,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_attempts: 3,
            fan_out_limit: None,
            ai_timeout: Duration::from_secs(5),
            history_limit: 1_000,
            pending_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    /// Sets the negotiation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the AI call bound.
    #[must_use]
    pub const fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai_timeout = timeout;
        self
    }

    /// Sets how long proxied results are held and how often they are swept.
    #[must_use]
    pub const fn with_retention(mut self, pending_ttl: Duration, sweep_interval: Duration) -> Self {
        self.pending_ttl = pending_ttl;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Worst-case time from receiving a proxied request to replying with an
    /// offer, given the bounds this orchestrator negotiates with.
    ///
    /// Covers the three AI stages plus one negotiation per sequential
    /// attempt, or a single concurrent round in fan-out mode. Requestors
    /// should wait at least this long for a proxied offer.
    #[must_use]
    pub fn proxy_offer_bound(&self, timeouts: &NegotiationTimeouts) -> Duration {
        let rounds = match self.mode {
            SelectionMode::Sequential => u32::try_from(self.max_attempts.max(1)).unwrap_or(u32::MAX),
            SelectionMode::FanOut => 1,
        };
        self.ai_timeout.saturating_mul(3) + (timeouts.offer + timeouts.fulfillment).saturating_mul(rounds)
    }

    /// Caps the fan-out width.
    #[must_use]
    pub const fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = Some(limit);
        self
    }
}

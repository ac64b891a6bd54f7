//! Cache configuration and freshness policies.

use std::collections::HashMap;
use std::time::Duration;

use bazaar_core::Capability;
use chrono::{DateTime, Utc};

/// Default endpoint lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default bound on one payload generation call.
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a cache hit regenerates its payload before being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreshnessPolicy {
    /// Serve the stored payload as-is.
    #[default]
    Never,
    /// Regenerate on every hit.
    Always,
    /// Regenerate when the payload was last produced at least this long ago.
    OlderThan(Duration),
}

impl FreshnessPolicy {
    /// Returns true if a payload last produced at `refreshed_at` should be
    /// regenerated at `now`.
    #[must_use]
    pub fn wants_refresh(&self, refreshed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OlderThan(age) => {
                let elapsed = (now - refreshed_at).to_std().unwrap_or(Duration::ZERO);
                elapsed >= *age
            }
        }
    }
}

/// Settings for a [`crate::ServiceCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a newly created endpoint.
    pub ttl: Duration,
    /// Bound on each generator call.
    pub generate_timeout: Duration,
    /// Default freshness policy.
    pub freshness: FreshnessPolicy,
    /// Per-capability policy overrides.
    pub overrides: HashMap<Capability, FreshnessPolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            freshness: FreshnessPolicy::default(),
            overrides: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Sets the endpoint lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the generator bound.
    #[must_use]
    pub const fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Sets the default freshness policy.
    #[must_use]
    pub const fn with_freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.freshness = policy;
        self
    }

    /// Overrides the freshness policy for one capability.
    #[must_use]
    pub fn with_override(mut self, capability: Capability, policy: FreshnessPolicy) -> Self {
        self.overrides.insert(capability, policy);
        self
    }

    /// Policy in effect for a capability.
    #[must_use]
    pub fn policy_for(&self, capability: &Capability) -> FreshnessPolicy {
        self.overrides.get(capability).copied().unwrap_or(self.freshness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FreshnessPolicy::Never, 0, false ; "never at zero age")]
    #[test_case(FreshnessPolicy::Never, 10_000, false ; "never when old")]
    #[test_case(FreshnessPolicy::Always, 0, true ; "always at zero age")]
    #[test_case(FreshnessPolicy::OlderThan(Duration::from_secs(60)), 59, false ; "younger than threshold")]
    #[test_case(FreshnessPolicy::OlderThan(Duration::from_secs(60)), 60, true ; "at threshold")]
    fn wants_refresh(policy: FreshnessPolicy, age_secs: i64, expected: bool) {
        let now = Utc::now();
        let refreshed_at = now - chrono::Duration::seconds(age_secs);
        assert_eq!(policy.wants_refresh(refreshed_at, now), expected);
    }

    #[test]
    fn clock_skew_never_triggers_age_refresh() {
        let now = Utc::now();
        let future = now + chrono::Duration::seconds(30);
        assert!(!FreshnessPolicy::OlderThan(Duration::from_secs(1)).wants_refresh(future, now));
    }

    #[test]
    fn overrides_take_precedence() {
        let finance = Capability::new("finance").unwrap();
        let news = Capability::new("ai-news").unwrap();
        let config = CacheConfig::default()
            .with_freshness(FreshnessPolicy::Never)
            .with_override(finance.clone(), FreshnessPolicy::Always);

        assert_eq!(config.policy_for(&finance), FreshnessPolicy::Always);
        assert_eq!(config.policy_for(&news), FreshnessPolicy::Never);
        assert_eq!(config.ttl, DEFAULT_TTL);
    }
}

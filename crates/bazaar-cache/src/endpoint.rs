//! Cached service endpoints.

use bazaar_core::{BotId, Capability, Fingerprint, ServiceId, ServiceListing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider-created service instance bound to one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Dedup key this endpoint serves.
    pub fingerprint: Fingerprint,
    /// Unique service ID, stable across refreshes.
    pub service_id: ServiceId,
    /// Capability it was created for.
    pub capability: Capability,
    /// Current payload.
    pub payload: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the payload was last produced.
    pub refreshed_at: DateTime<Utc>,
    /// Expiry. The endpoint is live while `now <= expires_at`.
    pub expires_at: DateTime<Utc>,
    /// Number of times the endpoint was reused.
    pub hit_count: u64,
}

impl ServiceEndpoint {
    /// Returns true if the endpoint may still be served at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    /// Builds the mediator listing for this endpoint.
    #[must_use]
    pub fn listing(&self, provider_id: BotId) -> ServiceListing {
        ServiceListing {
            service_id: self.service_id,
            provider_id,
            capability: self.capability.clone(),
            fingerprint: self.fingerprint,
            expires_at: self.expires_at,
        }
    }
}

/// How a resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// A new endpoint was generated.
    Created,
    /// A live endpoint was served unchanged.
    Reused,
    /// A live endpoint was served with a regenerated payload.
    Refreshed,
}

/// Result of resolving a request through the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Snapshot of the endpoint after resolution.
    pub endpoint: ServiceEndpoint,
    /// How it was obtained.
    pub outcome: ResolveOutcome,
}

impl Resolution {
    /// Returns true if an existing endpoint was served.
    #[must_use]
    pub const fn reused(&self) -> bool {
        !matches!(self.outcome, ResolveOutcome::Created)
    }
}

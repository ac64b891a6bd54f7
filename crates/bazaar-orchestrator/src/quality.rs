//! Historical response quality per provider.

use std::collections::HashMap;

use bazaar_core::BotId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Running quality average for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    /// Number of ranked responses seen.
    pub samples: u64,
    /// Mean score over those responses.
    pub mean: f64,
}

impl QualityRecord {
    fn observe(&mut self, score: f64) {
        self.samples += 1;
        self.mean += (score - self.mean) / self.samples as f64;
    }
}

/// Tracks how well each provider's responses have ranked.
#[derive(Debug, Default)]
pub struct QualityLedger {
    records: RwLock<HashMap<BotId, QualityRecord>>,
}

impl QualityLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one ranking score into the provider's average. Non-finite
    /// scores are ignored; the rest are clamped to `[0, 1]`.
    pub fn record(&self, provider_id: &BotId, score: f64) {
        if !score.is_finite() {
            return;
        }
        let mut records = self.records.write();
        records
            .entry(provider_id.clone())
            .or_insert(QualityRecord { samples: 0, mean: 0.0 })
            .observe(score.clamp(0.0, 1.0));
    }

    /// Mean quality for a provider, if it has been ranked before.
    #[must_use]
    pub fn score(&self, provider_id: &BotId) -> Option<f64> {
        self.records.read().get(provider_id).map(|r| r.mean)
    }

    /// Full record for a provider.
    #[must_use]
    pub fn get(&self, provider_id: &BotId) -> Option<QualityRecord> {
        self.records.read().get(provider_id).copied()
    }

    /// Number of providers with history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no provider has history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

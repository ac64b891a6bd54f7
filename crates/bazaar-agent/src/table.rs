//! Per-bot store of negotiation records.

use std::collections::HashMap;
use std::time::Duration;

use bazaar_core::{BotId, RequestId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::NegotiationError;
use crate::state::{NegotiationRecord, NegotiationState};

type Key = (RequestId, BotId);

/// What one table sweep did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSweep {
    /// Records moved to `Expired` because they outlived the deadline.
    pub expired: Vec<NegotiationRecord>,
    /// Terminal records dropped after the grace period.
    pub dropped: usize,
}

/// Negotiation records owned by one bot, keyed by request and provider.
#[derive(Debug, Default)]
pub struct NegotiationTable {
    records: RwLock<HashMap<Key, NegotiationRecord>>,
}

impl NegotiationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh record.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::AlreadyExists`] if a record for the same
    /// request and provider is present.
    pub fn insert(&self, record: NegotiationRecord) -> Result<(), NegotiationError> {
        let key = (record.request_id(), record.provider_id.clone());
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(NegotiationError::AlreadyExists {
                request_id: key.0,
                provider_id: key.1,
            });
        }
        records.insert(key, record);
        Ok(())
    }

    /// Returns a copy of one record.
    #[must_use]
    pub fn get(&self, request_id: RequestId, provider_id: &BotId) -> Option<NegotiationRecord> {
        self.records.read().get(&(request_id, provider_id.clone())).cloned()
    }

    /// All records for one request, any provider.
    #[must_use]
    pub fn for_request(&self, request_id: RequestId) -> Vec<NegotiationRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.request_id() == request_id)
            .cloned()
            .collect()
    }

    /// Applies `f` to one record under the table lock and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::UnknownNegotiation`] if no record exists,
    /// or whatever `f` returns.
    pub fn update<T>(
        &self,
        request_id: RequestId,
        provider_id: &BotId,
        f: impl FnOnce(&mut NegotiationRecord) -> Result<T, NegotiationError>,
    ) -> Result<T, NegotiationError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&(request_id, provider_id.clone()))
            .ok_or_else(|| NegotiationError::UnknownNegotiation {
                request_id,
                provider_id: provider_id.clone(),
            })?;
        f(record)
    }

    /// Moves one record to `next` at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or the move is not allowed.
    pub fn transition_at(
        &self,
        request_id: RequestId,
        provider_id: &BotId,
        next: NegotiationState,
        now: DateTime<Utc>,
    ) -> Result<(), NegotiationError> {
        self.update(request_id, provider_id, |record| record.transition_at(next, now))
    }

    /// Removes and returns one record.
    pub fn remove(&self, request_id: RequestId, provider_id: &BotId) -> Option<NegotiationRecord> {
        self.records.write().remove(&(request_id, provider_id.clone()))
    }

    /// Expires non-terminal records created more than `deadline` ago and drops
    /// terminal records whose last transition is more than `grace` ago.
    pub fn sweep(&self, now: DateTime<Utc>, grace: Duration, deadline: Duration) -> TableSweep {
        let grace = to_chrono(grace);
        let deadline = to_chrono(deadline);
        let mut sweep = TableSweep::default();
        let mut records = self.records.write();

        for record in records.values_mut() {
            if !record.is_terminal() && now - record.created_at() > deadline {
                let from = record.state();
                if record.expire_at("abandoned", now).is_ok() {
                    debug!(
                        request_id = %record.request_id(),
                        provider = %record.provider_id,
                        from = %from,
                        "Expired abandoned negotiation"
                    );
                    sweep.expired.push(record.clone());
                }
            }
        }

        let before = records.len();
        records.retain(|_, r| !(r.is_terminal() && now - r.updated_at() > grace));
        sweep.dropped = before - records.len();
        sweep
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-terminal records.
    #[must_use]
    pub fn active(&self) -> usize {
        self.records.read().values().filter(|r| !r.is_terminal()).count()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

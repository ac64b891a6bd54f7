//! Bounded record of orchestrated requests.

use std::collections::VecDeque;

use bazaar_core::{BotId, RequestId, ServiceRequest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// How an orchestrated request ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryOutcome {
    /// At least one provider fulfilled; the best is named.
    Fulfilled {
        /// Best-ranked provider.
        provider_id: BotId,
        /// Its quality score.
        score: f64,
        /// Number of responses ranked.
        responses: usize,
    },
    /// Nothing was delivered.
    Failed {
        /// Reason code.
        reason: String,
    },
}

/// One orchestrated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// The request as the requestor composed it.
    pub original: ServiceRequest,
    /// Whether enhancement succeeded.
    pub enhanced: bool,
    /// Providers negotiated with, in selection order.
    pub candidates: Vec<BotId>,
    /// Result.
    pub outcome: HistoryOutcome,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Request this entry describes.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.original.request_id()
    }
}

/// Keeps the most recent orchestrated requests, dropping the oldest.
#[derive(Debug)]
pub struct RequestHistory {
    entries: Mutex<VecDeque<HistoryEntry>>,
    limit: usize,
}

impl RequestHistory {
    /// Creates a history holding at most `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Appends an entry.
    pub fn record(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entry for a request.
    #[must_use]
    pub fn get(&self, request_id: RequestId) -> Option<HistoryEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.request_id() == request_id)
            .cloned()
    }

    /// Up to `limit` entries, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::Capability;

    fn make_entry(reason: &str) -> HistoryEntry {
        HistoryEntry {
            original: ServiceRequest::new(BotId::from("reader"), Capability::new("ai-news").unwrap()),
            enhanced: false,
            candidates: vec![BotId::from("p")],
            outcome: HistoryOutcome::Failed { reason: reason.into() },
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn bounded_and_newest_first() {
        let history = RequestHistory::new(2);
        let first = make_entry("one");
        let first_id = first.request_id();
        history.record(first);
        history.record(make_entry("two"));
        history.record(make_entry("three"));

        assert_eq!(history.len(), 2);
        assert!(history.get(first_id).is_none());
        let reasons: Vec<_> = history
            .recent(10)
            .into_iter()
            .map(|e| match e.outcome {
                HistoryOutcome::Failed { reason } => reason,
                HistoryOutcome::Fulfilled { .. } => String::new(),
            })
            .collect();
        assert_eq!(reasons, vec!["three", "two"]);
    }

    #[test]
    fn lookup_by_request() {
        let history = RequestHistory::new(10);
        let entry = make_entry("x");
        let id = entry.request_id();
        history.record(entry.clone());
        assert_eq!(history.get(id), Some(entry));
    }
}

//! Append-only negotiation event log.

use std::collections::VecDeque;

use bazaar_core::{BotId, NegotiationEvent, Outcome, RequestId};
use serde::{Deserialize, Serialize};

/// Default number of events retained before the oldest are dropped.
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Criteria for querying the event log. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Match a single request.
    pub request_id: Option<RequestId>,
    /// Match a single provider.
    pub provider_id: Option<BotId>,
    /// Match one outcome.
    pub outcome: Option<Outcome>,
}

impl EventFilter {
    /// A filter that matches every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one request.
    #[must_use]
    pub const fn request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Restricts to one provider.
    #[must_use]
    pub fn provider(mut self, provider_id: BotId) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    /// Restricts to one outcome.
    #[must_use]
    pub const fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Returns true if the event satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, event: &NegotiationEvent) -> bool {
        self.request_id.is_none_or(|id| id == event.request_id)
            && self.provider_id.as_ref().is_none_or(|id| *id == event.provider_id)
            && self.outcome.is_none_or(|o| o == event.outcome)
    }
}

/// Bounded, append-only event store.
#[derive(Debug)]
pub(crate) struct EventLog {
    events: VecDeque<NegotiationEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub(crate) fn append(&mut self, event: NegotiationEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Newest matching events first, at most `limit`.
    pub(crate) fn query(&self, filter: &EventFilter, limit: usize) -> Vec<NegotiationEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) const fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(provider: &str, outcome: Outcome) -> NegotiationEvent {
        NegotiationEvent::new(RequestId::new(), BotId::from(provider), outcome)
    }

    #[test]
    fn log_drops_oldest_past_capacity() {
        let mut log = EventLog::new(2);
        let first = event("a", Outcome::Fulfilled);
        log.append(first.clone());
        log.append(event("b", Outcome::Fulfilled));
        log.append(event("c", Outcome::Rejected));

        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 1);
        let all = log.query(&EventFilter::all(), 10);
        assert!(all.iter().all(|e| e.request_id != first.request_id));
    }

    #[test]
    fn query_returns_newest_first_with_limit() {
        let mut log = EventLog::new(10);
        for name in ["a", "b", "c"] {
            log.append(event(name, Outcome::Fulfilled));
        }
        let recent = log.query(&EventFilter::all(), 2);
        let names: Vec<_> = recent.iter().map(|e| e.provider_id.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn filter_combines_criteria() {
        let target = event("a", Outcome::Expired);
        let filter = EventFilter::all().provider(BotId::from("a")).outcome(Outcome::Expired);
        assert!(filter.matches(&target));
        assert!(!filter.matches(&event("a", Outcome::Fulfilled)));
        assert!(!filter.matches(&event("b", Outcome::Expired)));
        assert!(EventFilter::all().request(target.request_id).matches(&target));
        assert!(!EventFilter::all().request(RequestId::new()).matches(&target));
    }
}

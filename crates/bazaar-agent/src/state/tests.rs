//! Unit tests and property-based tests for the negotiation state machine.

use super::*;
use bazaar_core::{Capability, Readiness, ServiceId};
use proptest::prelude::*;
use serde_json::json;
use test_case::test_case;

use NegotiationState::{Accepted, Created, Expired, Fulfilled, Offered, Rejected};

fn make_record() -> NegotiationRecord {
    let request = ServiceRequest::new(BotId::from("requestor"), Capability::new("ai-news").unwrap())
        .with_parameter("topic", json!("AI trends"));
    NegotiationRecord::new(request, BotId::from("provider"))
}

fn make_terms() -> OfferTerms {
    OfferTerms {
        confidence: 0.9,
        ttl_secs: 300,
        cached: false,
        readiness: Readiness::OnDemand,
    }
}

fn make_fulfillment(record: &NegotiationRecord) -> FulfillmentMessage {
    FulfillmentMessage {
        request_id: record.request_id(),
        service_id: ServiceId::new(),
        payload: json!({"headline": "AI trends"}),
        expires_at: None,
        reused: false,
        provider_id: None,
        quality_score: None,
    }
}

// ==========================================================================
// Transition table
// ==========================================================================

#[test_case(Created, Offered, true)]
#[test_case(Created, Accepted, false)]
#[test_case(Created, Fulfilled, false)]
#[test_case(Created, Rejected, true)]
#[test_case(Created, Expired, true)]
#[test_case(Offered, Created, false)]
#[test_case(Offered, Accepted, true)]
#[test_case(Offered, Fulfilled, false)]
#[test_case(Offered, Rejected, true)]
#[test_case(Offered, Expired, true)]
#[test_case(Accepted, Offered, false)]
#[test_case(Accepted, Fulfilled, true)]
#[test_case(Accepted, Rejected, true)]
#[test_case(Accepted, Expired, true)]
#[test_case(Fulfilled, Expired, false)]
#[test_case(Fulfilled, Rejected, false)]
#[test_case(Rejected, Offered, false)]
#[test_case(Rejected, Expired, false)]
#[test_case(Expired, Created, false)]
#[test_case(Expired, Fulfilled, false)]
fn transition_table(from: NegotiationState, to: NegotiationState, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn no_state_transitions_to_itself() {
    for state in NegotiationState::ALL {
        assert!(!state.can_transition_to(state), "{state} -> {state}");
    }
}

#[test]
fn terminal_states_have_no_exits() {
    for state in NegotiationState::ALL.into_iter().filter(NegotiationState::is_terminal) {
        for next in NegotiationState::ALL {
            assert!(!state.can_transition_to(next), "{state} -> {next}");
        }
    }
}

#[test]
fn outcomes_only_for_terminal_states() {
    assert_eq!(Fulfilled.outcome(), Some(Outcome::Fulfilled));
    assert_eq!(Rejected.outcome(), Some(Outcome::Rejected));
    assert_eq!(Expired.outcome(), Some(Outcome::Expired));
    assert_eq!(Created.outcome(), None);
    assert_eq!(Offered.outcome(), None);
    assert_eq!(Accepted.outcome(), None);
}

#[test]
fn state_serializes_to_snake_case() {
    assert_eq!(serde_json::to_string(&Fulfilled).unwrap(), "\"fulfilled\"");
    assert_eq!(Accepted.to_string(), "accepted");
}

// ==========================================================================
// Records
// ==========================================================================

#[test]
fn record_starts_created_with_history() {
    let record = make_record();
    assert_eq!(record.state(), Created);
    assert_eq!(record.transitions().len(), 1);
    assert_eq!(record.transitions()[0].state, Created);
    assert!(!record.is_terminal());
}

#[test]
fn happy_path_records_every_step() {
    let mut record = make_record();
    let t0 = record.created_at();
    record.offer_at(make_terms(), t0 + chrono::Duration::milliseconds(10)).unwrap();
    record.transition_at(Accepted, t0 + chrono::Duration::milliseconds(20)).unwrap();
    let response = make_fulfillment(&record);
    record.fulfill_at(response.clone(), t0 + chrono::Duration::milliseconds(30)).unwrap();

    let states: Vec<_> = record.transitions().iter().map(|t| t.state).collect();
    assert_eq!(states, vec![Created, Offered, Accepted, Fulfilled]);
    assert_eq!(record.offer, Some(make_terms()));
    assert_eq!(record.response, Some(response));
    assert_eq!(record.updated_at(), t0 + chrono::Duration::milliseconds(30));
    assert!(record.is_terminal());
}

#[test]
fn invalid_transition_leaves_record_untouched() {
    let mut record = make_record();
    let before = record.clone();

    let err = record.transition(Fulfilled).unwrap_err();
    assert_eq!(err, NegotiationError::InvalidTransition { from: Created, to: Fulfilled });
    assert_eq!(record, before);
}

#[test]
fn rejection_records_reason() {
    let mut record = make_record();
    record.reject_at("capability_mismatch", Utc::now()).unwrap();
    assert_eq!(record.state(), Rejected);
    assert_eq!(record.rejection.as_deref(), Some("capability_mismatch"));
    assert!(record.expire_at("late", Utc::now()).is_err());
    assert_eq!(record.rejection.as_deref(), Some("capability_mismatch"));
}

#[test]
fn accepted_can_still_fail() {
    let mut record = make_record();
    record.offer_at(make_terms(), Utc::now()).unwrap();
    record.transition(Accepted).unwrap();
    record.reject_at("generation_failed", Utc::now()).unwrap();
    assert_eq!(record.state(), Rejected);
}

#[test]
fn offer_requires_created() {
    let mut record = make_record();
    record.offer_at(make_terms(), Utc::now()).unwrap();
    assert!(record.offer_at(make_terms(), Utc::now()).is_err());
}

// ==========================================================================
// Property tests
// ==========================================================================

fn lifecycle_index(state: NegotiationState) -> usize {
    match state {
        Created => 0,
        Offered => 1,
        Accepted => 2,
        Fulfilled | Rejected | Expired => 3,
    }
}

fn any_state() -> impl Strategy<Value = NegotiationState> {
    prop::sample::select(NegotiationState::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_random_sequences_move_forward_only(steps in prop::collection::vec(any_state(), 0..20)) {
        let mut record = make_record();
        let mut seen = vec![record.state()];

        for next in steps {
            let before = record.state();
            match record.transition(next) {
                Ok(()) => {
                    prop_assert!(lifecycle_index(next) > lifecycle_index(before));
                    prop_assert!(!seen.contains(&next));
                    seen.push(next);
                }
                Err(NegotiationError::InvalidTransition { from, to }) => {
                    prop_assert_eq!(from, before);
                    prop_assert_eq!(to, next);
                    prop_assert_eq!(record.state(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }

        prop_assert_eq!(record.transitions().len(), seen.len());
        prop_assert!(record.transitions().len() <= 4);
    }

    #[test]
    fn prop_terminal_is_absorbing(steps in prop::collection::vec(any_state(), 1..12)) {
        let mut record = make_record();
        let mut terminal_at: Option<NegotiationState> = None;
        for next in steps {
            let _ = record.transition(next);
            if let Some(state) = terminal_at {
                prop_assert_eq!(record.state(), state);
            } else if record.is_terminal() {
                terminal_at = Some(record.state());
            }
        }
    }
}

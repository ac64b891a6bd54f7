//! # bazaar-agent
//!
//! Bots that trade services on the Bazaar marketplace.
//!
//! Every negotiation is a single round driven by the requesting side:
//!
//! ```text
//! Created ──offer──> Offered ──accept──> Accepted ──fulfill──> Fulfilled
//!    │                  │                   │
//!    └──────────────────┴───────────────────┴──> Rejected | Expired
//! ```
//!
//! - [`NegotiationDriver`] runs the requestor side of that exchange and is
//!   shared by [`RequestorBot`] and the orchestrator.
//! - [`ProviderBot`] answers requests with offers and resolves accepted ones
//!   through its [`ServiceCache`](bazaar_cache::ServiceCache).
//! - [`NegotiationTable`] holds the records on either side and reclaims
//!   abandoned ones on sweep.
//!
//! ## Example
//!
//! ```rust
//! use bazaar_agent::NegotiationState;
//!
//! assert!(NegotiationState::Created.can_transition_to(NegotiationState::Offered));
//! assert!(!NegotiationState::Fulfilled.can_transition_to(NegotiationState::Rejected));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod provider;
pub mod reporter;
pub mod requestor;
pub mod state;
pub mod table;
pub mod traits;

pub use driver::{Deal, NegotiationDriver, NegotiationTimeouts};
pub use error::{AgentError, NegotiationError, Result};
pub use provider::{
    MaintenanceReport, ProviderBot, ProviderConfig, REASON_GENERATION_FAILED, REASON_LOW_CONFIDENCE,
    REASON_UNKNOWN_REQUEST,
};
pub use reporter::{EventReporter, DEFAULT_REPORT_TIMEOUT};
pub use requestor::{RequestorBot, DEFAULT_REQUESTOR_GRACE, DEFAULT_REQUESTOR_SWEEP_INTERVAL};
pub use state::{NegotiationRecord, NegotiationState, Transition};
pub use table::{NegotiationTable, TableSweep};
pub use traits::{Negotiable, Registrable};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

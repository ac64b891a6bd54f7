//! # bazaar-orchestrator
//!
//! An AI-assisted broker for the Bazaar marketplace.
//!
//! For each request the [`Orchestrator`] discovers providers, lets the AI
//! service enrich the request ([`Enhancer`]), chooses whom to negotiate with
//! ([`ProviderSelector`]), negotiates sequentially or as a fan-out, and
//! orders the fulfilled responses ([`Ranker`]).
//!
//! Requestors can call [`Orchestrator::handle`] in-process or send it an
//! ordinary `Request` message: the orchestrator then acts as a transparent
//! proxy and answers with the same offer and fulfillment contract a
//! provider uses.
//!
//! ## Example
//!
//! ```rust
//! use bazaar_orchestrator::{OrchestratorConfig, SelectionMode};
//!
//! let config = OrchestratorConfig::default().with_mode(SelectionMode::FanOut);
//! assert_eq!(config.min_confidence, 0.7);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod enhancer;
pub mod error;
pub mod history;
pub mod orchestrator;
mod proxy;
pub mod quality;
pub mod ranker;
pub mod selector;

#[cfg(test)]
mod testing;

pub use config::{OrchestratorConfig, SelectionMode, DEFAULT_MIN_CONFIDENCE};
pub use enhancer::{Enhancement, Enhancer};
pub use error::{OrchestratorError, Result};
pub use history::{HistoryEntry, HistoryOutcome, RequestHistory};
pub use orchestrator::{OrchestratedResponse, Orchestrator, OrchestratorSweep};
pub use quality::{QualityLedger, QualityRecord};
pub use ranker::{RankSource, RankedResponse, Ranker, Ranking};
pub use selector::{ProviderSelector, ScoreSource, ScoredCandidate, Selection};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

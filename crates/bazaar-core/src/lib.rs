//! # bazaar-core
//!
//! Shared primitives for the Bazaar bot marketplace.
//!
//! This crate provides:
//!
//! - **Capabilities** - [`Capability`] tags validated against a [`CapabilityCatalog`]
//! - **Data model** - [`BotDescriptor`], [`ServiceRequest`], [`NegotiationEvent`], [`ServiceListing`]
//! - **Fingerprints** - [`Fingerprint`] digests used as the provider dedup key
//! - **Wire protocol** - [`Message`] and its payloads, exchanged as JSON between bots
//! - **Collaborator seams** - [`AiService`], [`Transport`], [`MessageHandler`], [`Directory`]
//!
//! ## Example
//!
//! ```rust
//! use bazaar_core::{BotId, Capability, Fingerprint, ServiceRequest};
//! use serde_json::json;
//!
//! let capability = Capability::new("ai-news").unwrap();
//! let a = ServiceRequest::new(BotId::from("requestor-1"), capability.clone())
//!     .with_parameter("topic", json!("AI  trends"));
//! let b = ServiceRequest::new(BotId::from("requestor-2"), capability)
//!     .with_parameter("topic", json!(" AI trends "));
//!
//! // Whitespace differences do not change the dedup key.
//! assert_eq!(Fingerprint::of_request(&a), Fingerprint::of_request(&b));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::future::Future;
use std::pin::Pin;

pub mod ai;
pub mod capability;
pub mod directory;
pub mod error;
pub mod fingerprint;
pub mod maintenance;
pub mod protocol;
pub mod transport;
pub mod types;

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use ai::{call_with_timeout, AiService, Evaluation};
pub use capability::{Capability, CapabilityCatalog};
pub use directory::Directory;
pub use error::{AiError, CapabilityError, DirectoryError, MarketError, TransportError};
pub use fingerprint::{normalize_text, Fingerprint};
pub use maintenance::spawn_periodic;
pub use protocol::{
    Decision, DecisionMessage, DeregistrationAck, DiscoveryQuery, FulfillmentMessage, Message,
    OfferMessage, OfferTerms, Readiness, RegistrationAck,
};
pub use transport::{send_with_timeout, LocalTransport, MessageHandler, Transport};
pub use types::{
    BotDescriptor, BotId, BotRole, NegotiationEvent, Outcome, Parameters, RequestId,
    ServiceId, ServiceListing, ServiceRequest,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

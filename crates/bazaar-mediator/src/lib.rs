//! # bazaar-mediator
//!
//! The central directory of the Bazaar marketplace.
//!
//! Bots register a [`BotDescriptor`](bazaar_core::BotDescriptor) listing the
//! capability tags they serve; requestors and orchestrators discover
//! providers by exact tag. The mediator also keeps an append-only log of
//! negotiation outcomes and the service endpoints providers announce.
//!
//! - [`Mediator`] - the in-memory registry, usable directly or as a
//!   [`Directory`](bazaar_core::Directory) / [`MessageHandler`](bazaar_core::MessageHandler)
//! - [`RemoteDirectory`] - a `Directory` that talks to a mediator over a transport
//!
//! ## Example
//!
//! ```rust
//! use bazaar_core::{BotDescriptor, BotRole, Capability};
//! use bazaar_mediator::Mediator;
//!
//! let mediator = Mediator::default();
//! let finance = Capability::new("finance").unwrap();
//!
//! mediator
//!     .register(BotDescriptor::new("quotes", BotRole::Provider, "local://quotes").with_capability(finance.clone()))
//!     .unwrap();
//!
//! let providers = mediator.discover(&finance, &[]);
//! assert_eq!(providers[0].bot_id.as_str(), "quotes");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
mod handler;
pub mod registry;
pub mod remote;

pub use error::{RegistryError, Result};
pub use events::{EventFilter, DEFAULT_MAX_EVENTS};
pub use registry::{Mediator, MediatorConfig, MediatorStats, DEFAULT_SWEEP_INTERVAL};
pub use remote::{RemoteDirectory, DEFAULT_DIRECTORY_TIMEOUT};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

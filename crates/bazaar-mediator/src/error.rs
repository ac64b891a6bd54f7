//! Error types for bazaar-mediator.

use bazaar_core::{BotId, CapabilityError, DirectoryError};
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A descriptor advertised a tag outside the capability catalog.
    #[error("bot '{bot_id}' advertises unknown capability: {source}")]
    UnknownCapability {
        /// Bot that was registering.
        bot_id: BotId,
        /// Catalog rejection.
        #[source]
        source: CapabilityError,
    },

    /// The descriptor is missing required fields.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The operation refers to a bot that is not registered.
    #[error("bot '{0}' is not registered")]
    UnknownBot(BotId),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for DirectoryError {
    fn from(err: RegistryError) -> Self {
        Self::Rejected(err.to_string())
    }
}

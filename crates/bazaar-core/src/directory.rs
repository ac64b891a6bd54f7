//! The directory seam between bots and the mediator.

use crate::capability::Capability;
use crate::error::DirectoryError;
use crate::protocol::{DeregistrationAck, RegistrationAck};
use crate::types::{BotDescriptor, BotId, NegotiationEvent, ServiceListing};
use crate::BoxFuture;

/// Registry operations a bot needs from the mediator.
///
/// Implemented in-process by the mediator itself and remotely by a client
/// that speaks [`crate::Message`] over a [`crate::Transport`].
pub trait Directory: Send + Sync {
    /// Registers or re-registers a bot.
    fn register(&self, descriptor: BotDescriptor) -> BoxFuture<'_, Result<RegistrationAck, DirectoryError>>;

    /// Lists bots advertising `capability`, excluding the given ids.
    fn discover<'a>(
        &'a self,
        capability: &'a Capability,
        exclude: &'a [BotId],
    ) -> BoxFuture<'a, Result<Vec<BotDescriptor>, DirectoryError>>;

    /// Removes a bot. Idempotent.
    fn deregister<'a>(&'a self, bot_id: &'a BotId) -> BoxFuture<'a, Result<DeregistrationAck, DirectoryError>>;

    /// Appends a negotiation outcome to the event log.
    fn log_event(&self, event: NegotiationEvent) -> BoxFuture<'_, Result<(), DirectoryError>>;

    /// Publishes a service endpoint listing.
    fn announce_service(&self, listing: ServiceListing) -> BoxFuture<'_, Result<(), DirectoryError>>;
}

//! Capabilities composed by concrete bots.

use bazaar_core::{
    BotDescriptor, BoxFuture, DecisionMessage, DeregistrationAck, Directory, DirectoryError, Message,
    RegistrationAck, ServiceRequest,
};

/// A bot that can announce itself to a directory.
pub trait Registrable {
    /// The descriptor this bot registers with.
    fn descriptor(&self) -> &BotDescriptor;

    /// Registers the bot.
    fn register_with<'a>(&'a self, directory: &'a dyn Directory) -> BoxFuture<'a, Result<RegistrationAck, DirectoryError>> {
        directory.register(self.descriptor().clone())
    }

    /// Removes the bot.
    fn deregister_from<'a>(
        &'a self,
        directory: &'a dyn Directory,
    ) -> BoxFuture<'a, Result<DeregistrationAck, DirectoryError>> {
        directory.deregister(&self.descriptor().bot_id)
    }
}

/// Provider side of the negotiation protocol.
///
/// Both operations always produce a reply; a provider never drops a
/// request silently.
pub trait Negotiable: Send + Sync {
    /// Answers a request with an offer or a rejection.
    fn on_request(&self, request: ServiceRequest) -> BoxFuture<'_, Message>;

    /// Answers a decision with a fulfillment, an acknowledgement, or a rejection.
    fn on_decision(&self, decision: DecisionMessage) -> BoxFuture<'_, Message>;
}

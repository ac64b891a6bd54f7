//! Wire and in-process access to the mediator.

use bazaar_core::{
    BotDescriptor, BotId, BoxFuture, Capability, DeregistrationAck, Directory, DirectoryError, Message,
    MessageHandler, NegotiationEvent, RegistrationAck, ServiceListing,
};
use tracing::warn;

use crate::registry::Mediator;

impl Mediator {
    /// Answers one wire message.
    #[must_use]
    pub fn dispatch(&self, message: Message) -> Message {
        match message {
            Message::Register { descriptor } => match self.register(descriptor) {
                Ok(ack) => Message::Registered(ack),
                Err(err) => Message::error(err.to_string()),
            },
            Message::Discover(query) => Message::Discovered {
                bots: self.discover(&query.capability, &query.exclude),
            },
            Message::Deregister { bot_id } => Message::Deregistered(self.deregister(&bot_id)),
            Message::LogEvent { event } => {
                self.log_event(event);
                Message::Ack
            }
            Message::AnnounceService { listing } => match self.announce_service(listing) {
                Ok(()) => Message::Ack,
                Err(err) => Message::error(err.to_string()),
            },
            other => {
                warn!(kind = other.kind(), "Mediator received unsupported message");
                Message::error(format!("mediator does not handle '{}' messages", other.kind()))
            }
        }
    }
}

impl MessageHandler for Mediator {
    fn handle(&self, message: Message) -> BoxFuture<'_, Message> {
        Box::pin(async move { self.dispatch(message) })
    }
}

impl Directory for Mediator {
    fn register(&self, descriptor: BotDescriptor) -> BoxFuture<'_, Result<RegistrationAck, DirectoryError>> {
        Box::pin(async move { Mediator::register(self, descriptor).map_err(DirectoryError::from) })
    }

    fn discover<'a>(
        &'a self,
        capability: &'a Capability,
        exclude: &'a [BotId],
    ) -> BoxFuture<'a, Result<Vec<BotDescriptor>, DirectoryError>> {
        Box::pin(async move { Ok(Mediator::discover(self, capability, exclude)) })
    }

    fn deregister<'a>(&'a self, bot_id: &'a BotId) -> BoxFuture<'a, Result<DeregistrationAck, DirectoryError>> {
        Box::pin(async move { Ok(Mediator::deregister(self, bot_id)) })
    }

    fn log_event(&self, event: NegotiationEvent) -> BoxFuture<'_, Result<(), DirectoryError>> {
        Box::pin(async move {
            Mediator::log_event(self, event);
            Ok(())
        })
    }

    fn announce_service(&self, listing: ServiceListing) -> BoxFuture<'_, Result<(), DirectoryError>> {
        Box::pin(async move { Mediator::announce_service(self, listing).map_err(DirectoryError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bazaar_core::{BotRole, DiscoveryQuery, LocalTransport, Outcome, RequestId, Transport};

    use crate::events::EventFilter;

    fn cap(tag: &str) -> Capability {
        Capability::new(tag).unwrap()
    }

    fn descriptor(id: &str) -> BotDescriptor {
        BotDescriptor::new(id, BotRole::Provider, format!("local://{id}")).with_capability(cap("finance"))
    }

    #[tokio::test]
    async fn wire_register_and_discover() {
        let mediator = Arc::new(Mediator::default());
        let transport = LocalTransport::new();
        transport.bind("local://mediator", mediator.clone());

        let reply = transport
            .send("local://mediator", Message::Register { descriptor: descriptor("a") })
            .await
            .unwrap();
        assert!(matches!(reply, Message::Registered(RegistrationAck { overwritten: false, .. })));

        let reply = transport
            .send("local://mediator", Message::Discover(DiscoveryQuery::new(cap("finance"))))
            .await
            .unwrap();
        match reply {
            Message::Discovered { bots } => assert_eq!(bots.len(), 1),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wire_log_event_acks() {
        let mediator = Mediator::default();
        let reply = mediator
            .handle(Message::LogEvent {
                event: NegotiationEvent::new(RequestId::new(), BotId::from("a"), Outcome::Fulfilled),
            })
            .await;
        assert_eq!(reply, Message::Ack);
        assert_eq!(mediator.events(&EventFilter::all(), 10).len(), 1);
    }

    #[tokio::test]
    async fn wire_rejects_negotiation_messages() {
        let mediator = Mediator::default();
        let reply = mediator.handle(Message::Ack).await;
        assert!(matches!(reply, Message::Error { .. }));
    }

    #[tokio::test]
    async fn directory_maps_registry_errors() {
        let mediator = Mediator::default();
        let err = Directory::register(&mediator, BotDescriptor::new("", BotRole::Provider, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Rejected(_)));

        let ack = Directory::deregister(&mediator, &BotId::from("nobody")).await.unwrap();
        assert!(!ack.removed);
    }
}

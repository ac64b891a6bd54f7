//! Client for a mediator reached over a transport.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{
    send_with_timeout, BotDescriptor, BotId, BoxFuture, Capability, DeregistrationAck, Directory, DirectoryError,
    DiscoveryQuery, Message, NegotiationEvent, RegistrationAck, ServiceListing, Transport,
};

/// Default bound on one mediator round trip.
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Directory`] backed by wire messages to a mediator endpoint.
pub struct RemoteDirectory {
    transport: Arc<dyn Transport>,
    endpoint: String,
    timeout: Duration,
}

impl RemoteDirectory {
    /// Creates a client for the mediator at `endpoint`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            timeout: DEFAULT_DIRECTORY_TIMEOUT,
        }
    }

    /// Sets the round-trip bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mediator endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, message: Message) -> Result<Message, DirectoryError> {
        let reply = send_with_timeout(self.transport.as_ref(), &self.endpoint, message, self.timeout).await?;
        match reply {
            Message::Error { reason } => Err(DirectoryError::Rejected(reason)),
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for RemoteDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDirectory")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn unexpected(expected: &str, got: &Message) -> DirectoryError {
    DirectoryError::UnexpectedReply(format!("expected {expected}, got {}", got.kind()))
}

impl Directory for RemoteDirectory {
    fn register(&self, descriptor: BotDescriptor) -> BoxFuture<'_, Result<RegistrationAck, DirectoryError>> {
        Box::pin(async move {
            match self.call(Message::Register { descriptor }).await? {
                Message::Registered(ack) => Ok(ack),
                other => Err(unexpected("registered", &other)),
            }
        })
    }

    fn discover<'a>(
        &'a self,
        capability: &'a Capability,
        exclude: &'a [BotId],
    ) -> BoxFuture<'a, Result<Vec<BotDescriptor>, DirectoryError>> {
        Box::pin(async move {
            let query = DiscoveryQuery {
                capability: capability.clone(),
                exclude: exclude.to_vec(),
            };
            match self.call(Message::Discover(query)).await? {
                Message::Discovered { bots } => Ok(bots),
                other => Err(unexpected("discovered", &other)),
            }
        })
    }

    fn deregister<'a>(&'a self, bot_id: &'a BotId) -> BoxFuture<'a, Result<DeregistrationAck, DirectoryError>> {
        Box::pin(async move {
            match self.call(Message::Deregister { bot_id: bot_id.clone() }).await? {
                Message::Deregistered(ack) => Ok(ack),
                other => Err(unexpected("deregistered", &other)),
            }
        })
    }

    fn log_event(&self, event: NegotiationEvent) -> BoxFuture<'_, Result<(), DirectoryError>> {
        Box::pin(async move {
            match self.call(Message::LogEvent { event }).await? {
                Message::Ack => Ok(()),
                other => Err(unexpected("ack", &other)),
            }
        })
    }

    fn announce_service(&self, listing: ServiceListing) -> BoxFuture<'_, Result<(), DirectoryError>> {
        Box::pin(async move {
            match self.call(Message::AnnounceService { listing }).await? {
                Message::Ack => Ok(()),
                other => Err(unexpected("ack", &other)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{BotRole, LocalTransport, MessageHandler};

    use crate::registry::Mediator;

    struct Silent;

    impl MessageHandler for Silent {
        fn handle(&self, _message: Message) -> BoxFuture<'_, Message> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Message::Ack
            })
        }
    }

    fn cap(tag: &str) -> Capability {
        Capability::new(tag).unwrap()
    }

    fn setup() -> (Arc<Mediator>, RemoteDirectory) {
        let mediator = Arc::new(Mediator::default());
        let transport = Arc::new(LocalTransport::new());
        transport.bind("local://mediator", mediator.clone());
        (mediator, RemoteDirectory::new(transport, "local://mediator"))
    }

    #[tokio::test]
    async fn remote_round_trip() {
        let (mediator, directory) = setup();
        let descriptor =
            BotDescriptor::new("a", BotRole::Provider, "local://a").with_capability(cap("finance"));

        let ack = directory.register(descriptor).await.unwrap();
        assert_eq!(ack.bot_id.as_str(), "a");
        assert_eq!(mediator.len(), 1);

        let found = directory.discover(&cap("finance"), &[]).await.unwrap();
        assert_eq!(found.len(), 1);
        let found = directory.discover(&cap("finance"), &[BotId::from("a")]).await.unwrap();
        assert!(found.is_empty());

        assert!(directory.deregister(&BotId::from("a")).await.unwrap().removed);
        assert!(mediator.is_empty());
    }

    #[tokio::test]
    async fn remote_rejection_is_surfaced() {
        let (_mediator, directory) = setup();
        let err = directory
            .register(BotDescriptor::new("", BotRole::Provider, "local://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Rejected(_)));
    }

    #[tokio::test]
    async fn unreachable_mediator_is_an_error_not_a_panic() {
        let directory = RemoteDirectory::new(Arc::new(LocalTransport::new()), "local://nowhere");
        let err = directory.discover(&cap("finance"), &[]).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn slow_mediator_times_out() {
        let transport = Arc::new(LocalTransport::new());
        transport.bind("local://slow", Arc::new(Silent));
        let directory =
            RemoteDirectory::new(transport, "local://slow").with_timeout(Duration::from_millis(30));

        let err = directory.discover(&cap("finance"), &[]).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unreachable(_)));
    }
}

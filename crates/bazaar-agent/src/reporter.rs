//! Fire-and-forget notifications to the mediator.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{Directory, NegotiationEvent, ServiceListing};
use tracing::{debug, warn};

/// Default bound on one notification.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends outcome events and service listings without waiting for them.
///
/// Each notification runs on its own task with a bounded timeout; failures
/// are logged and dropped.
#[derive(Clone)]
pub struct EventReporter {
    directory: Option<Arc<dyn Directory>>,
    timeout: Duration,
}

impl EventReporter {
    /// Creates a reporter for `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self {
            directory: Some(directory),
            timeout,
        }
    }

    /// A reporter that sends nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            directory: None,
            timeout: DEFAULT_REPORT_TIMEOUT,
        }
    }

    /// Returns true if notifications go anywhere.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.directory.is_some()
    }

    /// Reports a negotiation outcome.
    pub fn report(&self, event: NegotiationEvent) {
        let Some(directory) = self.directory.clone() else {
            return;
        };
        let timeout = self.timeout;
        tokio::spawn(async move {
            let request_id = event.request_id;
            match tokio::time::timeout(timeout, directory.log_event(event)).await {
                Ok(Ok(())) => debug!(request_id = %request_id, "Reported negotiation outcome"),
                Ok(Err(err)) => warn!(request_id = %request_id, error = %err, "Failed to report outcome"),
                Err(_) => warn!(request_id = %request_id, "Timed out reporting outcome"),
            }
        });
    }

    /// Announces a service endpoint.
    pub fn announce(&self, listing: ServiceListing) {
        let Some(directory) = self.directory.clone() else {
            return;
        };
        let timeout = self.timeout;
        tokio::spawn(async move {
            let service_id = listing.service_id;
            match tokio::time::timeout(timeout, directory.announce_service(listing)).await {
                Ok(Ok(())) => debug!(service_id = %service_id, "Announced service"),
                Ok(Err(err)) => warn!(service_id = %service_id, error = %err, "Failed to announce service"),
                Err(_) => warn!(service_id = %service_id, "Timed out announcing service"),
            }
        });
    }
}

impl std::fmt::Debug for EventReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReporter")
            .field("enabled", &self.is_enabled())
            .field("timeout", &self.timeout)
            .finish()
    }
}

//! The central mediator registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{
    BotDescriptor, BotId, Capability, CapabilityCatalog, DeregistrationAck, NegotiationEvent, RegistrationAck,
    ServiceId, ServiceListing, spawn_periodic,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::events::{EventFilter, EventLog, DEFAULT_MAX_EVENTS};

/// Settings for a [`Mediator`].
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Capability allow-list. Empty accepts every well-formed tag.
    pub catalog: CapabilityCatalog,
    /// Events retained in the log.
    pub max_events: usize,
    /// Period of the expired-listing sweep run by
    /// [`Mediator::spawn_maintenance`].
    pub sweep_interval: Duration,
}

/// Default period of the listing sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            catalog: CapabilityCatalog::open(),
            max_events: DEFAULT_MAX_EVENTS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Registry sizes, as reported by the health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediatorStats {
    /// Registered bots.
    pub bots: usize,
    /// Stored service listings, live or not yet swept.
    pub listings: usize,
    /// Events in the log.
    pub events: usize,
    /// Events dropped because the log was full.
    pub dropped_events: u64,
}

#[derive(Debug)]
struct BotEntry {
    descriptor: BotDescriptor,
    /// Position in discovery order, kept across re-registration.
    order: u64,
}

#[derive(Debug, Default)]
struct Bots {
    entries: HashMap<BotId, BotEntry>,
    next_order: u64,
}

/// Registry of bots, their capabilities, announced services, and outcomes.
///
/// All state is in memory and lives as long as the mediator.
///
/// The bot table sits behind one lock, so registrations are serialized
/// across all bot IDs, not only per ID. The critical section is a single
/// map upsert; last write wins for a repeated ID.
#[derive(Debug)]
pub struct Mediator {
    catalog: CapabilityCatalog,
    sweep_interval: Duration,
    bots: RwLock<Bots>,
    listings: RwLock<HashMap<ServiceId, ServiceListing>>,
    events: RwLock<EventLog>,
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new(MediatorConfig::default())
    }
}

impl Mediator {
    /// Creates an empty mediator.
    #[must_use]
    pub fn new(config: MediatorConfig) -> Self {
        Self {
            catalog: config.catalog,
            sweep_interval: config.sweep_interval,
            bots: RwLock::new(Bots::default()),
            listings: RwLock::new(HashMap::new()),
            events: RwLock::new(EventLog::new(config.max_events)),
        }
    }

    /// Returns the capability catalog.
    #[must_use]
    pub const fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Registers a bot, replacing any existing descriptor with the same ID.
    ///
    /// A replaced bot keeps its original position in discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor has a blank ID or endpoint, or
    /// advertises a capability outside the catalog.
    pub fn register(&self, mut descriptor: BotDescriptor) -> Result<RegistrationAck> {
        if descriptor.bot_id.is_blank() {
            return Err(RegistryError::InvalidDescriptor("bot_id must not be blank".into()));
        }
        if descriptor.endpoint.trim().is_empty() {
            return Err(RegistryError::InvalidDescriptor(format!(
                "bot '{}' has no endpoint",
                descriptor.bot_id
            )));
        }
        for capability in &descriptor.capabilities {
            self.catalog
                .check(capability)
                .map_err(|source| RegistryError::UnknownCapability {
                    bot_id: descriptor.bot_id.clone(),
                    source,
                })?;
        }

        descriptor.registered_at = Utc::now();
        let bot_id = descriptor.bot_id.clone();

        let mut bots = self.bots.write();
        let overwritten = if let Some(entry) = bots.entries.get_mut(&bot_id) {
            entry.descriptor = descriptor;
            true
        } else {
            let order = bots.next_order;
            bots.next_order += 1;
            bots.entries.insert(bot_id.clone(), BotEntry { descriptor, order });
            false
        };
        drop(bots);

        info!(bot = %bot_id, overwritten, "Registered bot");
        Ok(RegistrationAck { bot_id, overwritten })
    }

    /// Lists bots advertising exactly `capability`, in registration order,
    /// leaving out `exclude`.
    #[must_use]
    pub fn discover(&self, capability: &Capability, exclude: &[BotId]) -> Vec<BotDescriptor> {
        let excluded: HashSet<&BotId> = exclude.iter().collect();
        let bots = self.bots.read();
        let mut matches: Vec<&BotEntry> = bots
            .entries
            .values()
            .filter(|e| e.descriptor.has_capability(capability) && !excluded.contains(&e.descriptor.bot_id))
            .collect();
        matches.sort_by_key(|e| e.order);
        let found: Vec<BotDescriptor> = matches.into_iter().map(|e| e.descriptor.clone()).collect();
        drop(bots);

        debug!(capability = %capability, found = found.len(), "Discovery");
        found
    }

    /// Removes a bot and its service listings. Removing an unknown bot is a no-op.
    pub fn deregister(&self, bot_id: &BotId) -> DeregistrationAck {
        let removed = self.bots.write().entries.remove(bot_id).is_some();
        let dropped_listings = {
            let mut listings = self.listings.write();
            let before = listings.len();
            listings.retain(|_, l| l.provider_id != *bot_id);
            before - listings.len()
        };

        if removed {
            info!(bot = %bot_id, dropped_listings, "Deregistered bot");
        } else {
            debug!(bot = %bot_id, "Deregister for unknown bot");
        }
        DeregistrationAck {
            bot_id: bot_id.clone(),
            removed,
        }
    }

    /// Returns one bot's descriptor.
    #[must_use]
    pub fn get(&self, bot_id: &BotId) -> Option<BotDescriptor> {
        self.bots.read().entries.get(bot_id).map(|e| e.descriptor.clone())
    }

    /// Appends a negotiation outcome to the log.
    pub fn log_event(&self, event: NegotiationEvent) {
        debug!(
            request_id = %event.request_id,
            provider = %event.provider_id,
            outcome = %event.outcome,
            "Logged negotiation event"
        );
        self.events.write().append(event);
    }

    /// Most recent events matching `filter`, newest first, at most `limit`.
    #[must_use]
    pub fn events(&self, filter: &EventFilter, limit: usize) -> Vec<NegotiationEvent> {
        self.events.read().query(filter, limit)
    }

    /// Stores a service listing announced by a registered provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is not registered or the listing's
    /// capability is outside the catalog.
    pub fn announce_service(&self, listing: ServiceListing) -> Result<()> {
        if !self.bots.read().entries.contains_key(&listing.provider_id) {
            return Err(RegistryError::UnknownBot(listing.provider_id));
        }
        self.catalog
            .check(&listing.capability)
            .map_err(|source| RegistryError::UnknownCapability {
                bot_id: listing.provider_id.clone(),
                source,
            })?;

        debug!(
            service_id = %listing.service_id,
            provider = %listing.provider_id,
            capability = %listing.capability,
            "Service announced"
        );
        self.listings.write().insert(listing.service_id, listing);
        Ok(())
    }

    /// Live listings, optionally narrowed by capability and provider,
    /// soonest-expiring first.
    #[must_use]
    pub fn services(
        &self,
        capability: Option<&Capability>,
        provider: Option<&BotId>,
        now: DateTime<Utc>,
    ) -> Vec<ServiceListing> {
        let mut found: Vec<ServiceListing> = self
            .listings
            .read()
            .values()
            .filter(|l| !l.is_expired(now))
            .filter(|l| capability.is_none_or(|c| *c == l.capability))
            .filter(|l| provider.is_none_or(|p| *p == l.provider_id))
            .cloned()
            .collect();
        found.sort_by_key(|l| l.expires_at);
        found
    }

    /// Drops expired listings. Returns how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut listings = self.listings.write();
        let before = listings.len();
        listings.retain(|_, l| !l.is_expired(now));
        let removed = before - listings.len();
        drop(listings);

        if removed > 0 {
            info!(removed, "Swept expired service listings");
        }
        removed
    }

    /// Runs [`Mediator::sweep_expired`] every configured interval until
    /// `shutdown` turns true or its sender is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mediator = Arc::clone(self);
        spawn_periodic("mediator".into(), self.sweep_interval, shutdown, move || {
            mediator.sweep_expired(Utc::now());
        })
    }

    /// Number of registered bots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bots.read().entries.len()
    }

    /// Returns true if no bots are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current registry sizes.
    #[must_use]
    pub fn stats(&self) -> MediatorStats {
        let events = self.events.read();
        MediatorStats {
            bots: self.len(),
            listings: self.listings.read().len(),
            events: events.len(),
            dropped_events: events.dropped(),
        }
    }

    /// Drops every bot, listing, and event. Intended for shutdown.
    pub fn clear(&self) {
        *self.bots.write() = Bots::default();
        self.listings.write().clear();
        self.events.write().clear();
        info!("Cleared mediator");
    }
}

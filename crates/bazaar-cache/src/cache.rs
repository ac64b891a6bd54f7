//! The service cache.
//!
//! Each fingerprint owns a slot guarded by an async mutex. Resolution holds
//! only that slot while it checks expiry and, on a miss, awaits the
//! generator, so identical concurrent requests produce exactly one endpoint
//! while different fingerprints never wait on each other. The outer map lock
//! is held only to look up or insert a slot.
//!
//! [`ServiceCache::clear`] detaches every slot by bumping the cache epoch.
//! A resolution still holding a detached slot finishes normally, but its
//! endpoint is not counted and is not reachable through the map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{call_with_timeout, AiError, AiService, BoxFuture, Capability, Fingerprint, Parameters, ServiceId, ServiceRequest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::endpoint::{Resolution, ResolveOutcome, ServiceEndpoint};
use crate::error::{CacheError, Result};
use crate::policy::CacheConfig;

/// Produces payloads for new or refreshed endpoints.
pub trait Generator: Send + Sync {
    /// Generates a payload for a capability and parameter set.
    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, std::result::Result<Value, AiError>>;
}

impl Generator for Arc<dyn AiService> {
    fn generate<'a>(
        &'a self,
        capability: &'a Capability,
        parameters: &'a Parameters,
    ) -> BoxFuture<'a, std::result::Result<Value, AiError>> {
        self.as_ref().generate(capability, parameters)
    }
}

#[derive(Debug)]
struct Slot {
    epoch: u64,
    endpoint: Option<ServiceEndpoint>,
}

/// Counters exposed by [`ServiceCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Endpoints currently stored (live or not yet swept).
    pub entries: usize,
    /// Resolutions served from a live endpoint.
    pub hits: u64,
    /// Resolutions that needed a new endpoint.
    pub misses: u64,
    /// Hits that regenerated their payload.
    pub refreshes: u64,
    /// Refresh attempts that failed and served the stored payload.
    pub refresh_failures: u64,
    /// Expired endpoints removed.
    pub evictions: u64,
    /// Successful generator calls for new endpoints.
    pub generations: u64,
    /// Failed generator calls for new endpoints.
    pub generation_failures: u64,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired endpoints removed.
    pub evicted: usize,
    /// Slots skipped because a resolution held them.
    pub skipped_busy: usize,
    /// Empty idle slots dropped from the map.
    pub reclaimed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    evictions: AtomicU64,
    generations: AtomicU64,
    generation_failures: AtomicU64,
}

/// Fingerprint-keyed store of service endpoints with expiry.
#[derive(Debug)]
pub struct ServiceCache {
    config: CacheConfig,
    slots: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<Slot>>>>,
    epoch: AtomicU64,
    entries: AtomicUsize,
    counters: Counters,
}

impl ServiceCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            entries: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Endpoint lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Resolves a request at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Generation`] if a new endpoint was needed and
    /// the generator failed or timed out.
    pub async fn resolve(&self, request: &ServiceRequest, generator: &dyn Generator) -> Result<Resolution> {
        self.resolve_at(request, generator, Utc::now()).await
    }

    /// Resolves a request at `now`: reuses a live endpoint for the request's
    /// fingerprint or generates a new one.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Generation`] if a new endpoint was needed and
    /// the generator failed or timed out.
    pub async fn resolve_at(
        &self,
        request: &ServiceRequest,
        generator: &dyn Generator,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let fingerprint = Fingerprint::of_request(request);
        let capability = request.capability();
        let parameters = request.effective_parameters();
        let slot = self.slot(fingerprint);
        let mut guard = slot.lock().await;

        if let Some(endpoint) = guard.endpoint.as_mut() {
            if endpoint.is_live(now) {
                endpoint.hit_count += 1;
                self.counters.hits.fetch_add(1, Ordering::Relaxed);

                let mut outcome = ResolveOutcome::Reused;
                if self.config.policy_for(capability).wants_refresh(endpoint.refreshed_at, now) {
                    match call_with_timeout(self.config.generate_timeout, generator.generate(capability, parameters)).await {
                        Ok(payload) => {
                            endpoint.payload = payload;
                            endpoint.refreshed_at = now;
                            outcome = ResolveOutcome::Refreshed;
                            self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                            warn!(fingerprint = %fingerprint, error = %err, "Refresh failed, serving cached payload");
                        }
                    }
                }

                debug!(
                    fingerprint = %fingerprint,
                    service_id = %endpoint.service_id,
                    hit_count = endpoint.hit_count,
                    "Cache hit"
                );
                return Ok(Resolution {
                    endpoint: endpoint.clone(),
                    outcome,
                });
            }
        }

        if guard.endpoint.take().is_some() {
            self.uncount(guard.epoch, 1);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "Expired endpoint replaced on lookup");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let payload = match call_with_timeout(self.config.generate_timeout, generator.generate(capability, parameters)).await {
            Ok(payload) => payload,
            Err(source) => {
                self.counters.generation_failures.fetch_add(1, Ordering::Relaxed);
                warn!(fingerprint = %fingerprint, error = %source, "Payload generation failed");
                return Err(CacheError::Generation { fingerprint, source });
            }
        };
        self.counters.generations.fetch_add(1, Ordering::Relaxed);

        let endpoint = ServiceEndpoint {
            fingerprint,
            service_id: ServiceId::new(),
            capability: capability.clone(),
            payload,
            created_at: now,
            refreshed_at: now,
            expires_at: add_duration(now, self.config.ttl),
            hit_count: 0,
        };
        info!(
            fingerprint = %fingerprint,
            service_id = %endpoint.service_id,
            capability = %capability,
            expires_at = %endpoint.expires_at,
            "Created service endpoint"
        );
        guard.endpoint = Some(endpoint.clone());
        self.count(guard.epoch);

        Ok(Resolution {
            endpoint,
            outcome: ResolveOutcome::Created,
        })
    }

    /// Returns the live endpoint for a fingerprint, without counting a hit.
    ///
    /// Returns `None` if the slot is busy with a resolution.
    #[must_use]
    pub fn peek(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<ServiceEndpoint> {
        let slot = self.slots.lock().get(fingerprint).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.endpoint.as_ref().filter(|e| e.is_live(now)).cloned()
    }

    /// Snapshot of every live endpoint whose slot is not busy.
    #[must_use]
    pub fn endpoints(&self, now: DateTime<Utc>) -> Vec<ServiceEndpoint> {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        let mut endpoints: Vec<ServiceEndpoint> = slots
            .iter()
            .filter_map(|slot| {
                let guard = slot.try_lock().ok()?;
                guard.endpoint.as_ref().filter(|e| e.is_live(now)).cloned()
            })
            .collect();
        endpoints.sort_by_key(|e| e.created_at);
        endpoints
    }

    /// Evicts expired endpoints and drops idle empty slots.
    ///
    /// Busy slots are skipped, so a sweep never waits on a generation.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let (epoch, slots) = {
            let map = self.slots.lock();
            let slots: Vec<_> = map.values().cloned().collect();
            (self.epoch.load(Ordering::Relaxed), slots)
        };

        for slot in &slots {
            match slot.try_lock() {
                Ok(mut guard) => {
                    if guard.endpoint.as_ref().is_some_and(|e| !e.is_live(now)) {
                        guard.endpoint = None;
                        report.evicted += 1;
                    }
                }
                Err(_) => report.skipped_busy += 1,
            }
        }
        drop(slots);

        {
            let mut map = self.slots.lock();
            let before = map.len();
            // Only the map holds an idle slot; nobody can pick it up while the map lock is held.
            map.retain(|_, slot| {
                if Arc::strong_count(slot) > 1 {
                    return true;
                }
                slot.try_lock().map_or(true, |guard| guard.endpoint.is_some())
            });
            report.reclaimed = before - map.len();
        }

        if report.evicted > 0 {
            self.uncount(epoch, report.evicted);
            self.counters.evictions.fetch_add(report.evicted as u64, Ordering::Relaxed);
        }
        if report.evicted > 0 || report.skipped_busy > 0 {
            info!(
                evicted = report.evicted,
                skipped_busy = report.skipped_busy,
                reclaimed = report.reclaimed,
                "Swept service cache"
            );
        }
        report
    }

    /// Number of stored endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Returns true if no endpoints are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.counters.refresh_failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            generations: self.counters.generations.load(Ordering::Relaxed),
            generation_failures: self.counters.generation_failures.load(Ordering::Relaxed),
        }
    }

    /// Drops every slot. Intended for shutdown.
    ///
    /// Resolutions already in flight complete, but their endpoints are
    /// discarded with the detached slots.
    pub fn clear(&self) {
        let mut map = self.slots.lock();
        self.epoch.fetch_add(1, Ordering::Relaxed);
        map.clear();
        self.entries.store(0, Ordering::Relaxed);
        drop(map);
        info!("Cleared service cache");
    }

    fn slot(&self, fingerprint: Fingerprint) -> Arc<tokio::sync::Mutex<Slot>> {
        let mut map = self.slots.lock();
        let epoch = self.epoch.load(Ordering::Relaxed);
        Arc::clone(map.entry(fingerprint).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(Slot {
                epoch,
                endpoint: None,
            }))
        }))
    }

    // Entry counts are adjusted under the map lock so they cannot race a clear.
    fn count(&self, epoch: u64) {
        let _map = self.slots.lock();
        if epoch == self.epoch.load(Ordering::Relaxed) {
            self.entries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn uncount(&self, epoch: u64, n: usize) {
        let _map = self.slots.lock();
        if epoch == self.epoch.load(Ordering::Relaxed) {
            self.entries.fetch_sub(n, Ordering::Relaxed);
        }
    }
}

impl Default for ServiceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn add_duration(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

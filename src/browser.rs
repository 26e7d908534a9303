//! # Service Browser
//!
//! Poll-driven discovery engine. A browse session watches one service
//! type, resolves each announced instance to host/address/port and keeps
//! a registry of live instances keyed by name and interface.
//!
//! Provider callbacks land on the event bridge and are applied during
//! [`ServiceBrowser::poll`], so registry state and observer callbacks
//! stay on the caller's thread. Resolution is serialized through a FIFO
//! work list: one resolve is in flight at a time and the next starts
//! only after the current one completes, fails or is cancelled. That
//! bounds native resolver usage to a single handle per browser at the
//! cost of some latency under bursty announcements.
//!
//! ## Example
//!
//! ```ignore
//! let provider = Arc::new(MdnsSdProvider::new()?);
//! let mut browser = ServiceBrowser::new(provider);
//! browser.connect_service_added(|record| println!("found {record}"));
//! browser.start("_http._tcp")?;
//! loop {
//!     browser.poll();
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! ```

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::bridge::{BridgeSender, EventBridge};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::observer::{HandlerId, ObserverList};
use crate::provider::{BrowseHandle, DiscoveryProvider, ResolveHandle};
use crate::record::{Candidate, InstanceKey, Protocol, ServiceRecord};

/// Callback context handed to the provider for one browse session.
///
/// Methods copy their arguments and queue the event for the next
/// `poll()`; they may be called from any provider thread. Events carry
/// the session they were created for and are ignored once the browser
/// has been stopped.
#[derive(Clone)]
pub struct BrowseEvents {
    sender: BridgeSender<BrowserCore>,
    session: u64,
}

impl BrowseEvents {
    /// Reports an announced instance of the browsed type.
    pub fn instance_found(&self, name: &str, service_type: &str, domain: &str, interface: u32) {
        let session = self.session;
        let candidate = Candidate::new(InstanceKey::new(name, interface), service_type, domain);
        self.sender.push(move |core: &mut BrowserCore| {
            if core.session != session {
                debug!("ignoring announcement of {} from a stopped session", candidate.key);
                return;
            }
            core.on_instance_found(candidate);
        });
    }

    /// Reports that an instance is no longer announced.
    pub fn instance_removed(&self, name: &str, interface: u32) {
        let session = self.session;
        let key = InstanceKey::new(name, interface);
        self.sender.push(move |core: &mut BrowserCore| {
            if core.session != session {
                debug!("ignoring removal of {key} from a stopped session");
                return;
            }
            core.on_instance_removed(&key);
        });
    }

    /// Reports that the browse operation itself broke down.
    pub fn browse_failed(&self, reason: &str) {
        let session = self.session;
        let reason = reason.to_string();
        self.sender.push(move |core: &mut BrowserCore| {
            if core.session != session {
                debug!("ignoring browse failure from a stopped session: {reason}");
                return;
            }
            core.on_browse_failed(reason);
        });
    }
}

/// Callback context handed to the provider for one resolve operation.
#[derive(Clone)]
pub struct ResolveEvents {
    sender: BridgeSender<BrowserCore>,
    session: u64,
    op: u64,
}

impl ResolveEvents {
    /// Delivers the resolved endpoint for the candidate.
    pub fn resolved(&self, host: &str, address: &str, port: u16, protocol: Protocol) {
        let (session, op) = (self.session, self.op);
        let host = host.to_string();
        let address = address.to_string();
        self.sender.push(move |core: &mut BrowserCore| {
            if core.session != session {
                debug!("ignoring resolve result from a stopped session");
                return;
            }
            core.on_resolved(op, host, address, port, protocol);
        });
    }

    /// Reports that the resolve operation failed. The browser moves on
    /// to the next queued candidate.
    pub fn failed(&self, reason: &str) {
        let (session, op) = (self.session, self.op);
        let reason = reason.to_string();
        self.sender.push(move |core: &mut BrowserCore| {
            if core.session != session {
                debug!("ignoring resolve failure from a stopped session");
                return;
            }
            core.on_resolve_failed(op, reason);
        });
    }
}

struct ResolveInFlight {
    candidate: Candidate,
    handle: ResolveHandle,
    op: u64,
}

/// Engine state. Owned by [`ServiceBrowser`] and mutated only by the
/// polling thread, either directly or through drained bridge events.
struct BrowserCore {
    provider: Arc<dyn DiscoveryProvider>,
    sender: BridgeSender<BrowserCore>,
    /// Bumped on every stop; queued events from older sessions are
    /// discarded when drained.
    session: u64,
    browse: Option<BrowseHandle>,
    service_type: String,
    registry: HashMap<InstanceKey, ServiceRecord>,
    pending: VecDeque<Candidate>,
    resolving: Option<ResolveInFlight>,
    next_resolve_op: u64,
    added: ObserverList<ServiceRecord>,
    updated: ObserverList<ServiceRecord>,
    removed: ObserverList<ServiceRecord>,
    errors: ObserverList<Error>,
}

impl BrowserCore {
    fn on_instance_found(&mut self, candidate: Candidate) {
        let key = &candidate.key;
        // One announcement is enough while a resolve is already queued
        // or in flight for this key.
        if self.pending.iter().any(|queued| queued.key == *key)
            || self.resolving.as_ref().is_some_and(|inflight| inflight.candidate.key == *key)
        {
            debug!("{key} already waiting for resolution");
            return;
        }
        // Known instances are resolved again so address changes surface
        // as updates.
        debug!("instance {key} announced, queueing resolve");
        self.pending.push_back(candidate);
        self.resolve_next();
    }

    /// Starts the next queued resolve if none is in flight. Candidates
    /// the provider refuses are skipped.
    fn resolve_next(&mut self) {
        while self.resolving.is_none() {
            let Some(candidate) = self.pending.pop_front() else {
                return;
            };
            let op = self.next_resolve_op;
            self.next_resolve_op += 1;
            let events = ResolveEvents {
                sender: self.sender.clone(),
                session: self.session,
                op,
            };
            match self.provider.resolve_start(&candidate, events) {
                Ok(handle) => {
                    debug!("resolving {}", candidate.key);
                    self.resolving = Some(ResolveInFlight { candidate, handle, op });
                }
                Err(error) => {
                    warn!("resolve of {} refused: {error}", candidate.key);
                }
            }
        }
    }

    fn on_resolved(&mut self, op: u64, host: String, address: String, port: u16, protocol: Protocol) {
        let Some(inflight) = self.resolving.take() else {
            debug!("resolve result with nothing in flight");
            return;
        };
        if inflight.op != op {
            // Result of a resolve that was already cancelled.
            debug!("ignoring superseded resolve result");
            self.resolving = Some(inflight);
            return;
        }
        self.provider.resolve_stop(inflight.handle);

        let Candidate { key, service_type, domain } = inflight.candidate;
        let (record, is_new) = match self.registry.entry(key) {
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                record.domain = domain;
                record.host = host;
                record.protocol = protocol;
                record.address = address;
                record.port = port;
                (record.clone(), false)
            }
            Entry::Vacant(slot) => {
                let key = slot.key();
                let record = ServiceRecord {
                    name: key.name.clone(),
                    service_type,
                    domain,
                    host,
                    protocol,
                    address,
                    interface: key.interface,
                    port,
                };
                (slot.insert(record).clone(), true)
            }
        };

        if is_new {
            info!("service added: {record}");
            self.added.emit(&record);
        } else {
            info!("service updated: {record}");
            self.updated.emit(&record);
        }
        self.resolve_next();
    }

    fn on_resolve_failed(&mut self, op: u64, reason: String) {
        let Some(inflight) = self.resolving.take() else {
            debug!("resolve failure with nothing in flight");
            return;
        };
        if inflight.op != op {
            debug!("ignoring superseded resolve failure");
            self.resolving = Some(inflight);
            return;
        }
        self.provider.resolve_stop(inflight.handle);
        // The instance stays unknown until it is announced again.
        warn!("resolve of {} failed: {reason}", inflight.candidate.key);
        self.resolve_next();
    }

    fn on_instance_removed(&mut self, key: &InstanceKey) {
        // Forget queued work for the instance so a late resolve cannot
        // add a record the network just withdrew.
        self.pending.retain(|candidate| candidate.key != *key);
        if let Some(inflight) = self.resolving.take_if(|inflight| inflight.candidate.key == *key) {
            debug!("cancelling resolve of removed instance {key}");
            self.provider.resolve_stop(inflight.handle);
            self.resolve_next();
        }

        if let Some(record) = self.registry.remove(key) {
            info!("service removed: {record}");
            self.removed.emit(&record);
        } else {
            debug!("removal of unknown instance {key}");
        }
    }

    fn on_browse_failed(&mut self, reason: String) {
        warn!("browse for '{}' failed: {reason}", self.service_type);
        let service_type = self.service_type.clone();
        self.shutdown();
        self.errors.emit(&Error::BrowseFailed { service_type, reason });
    }

    /// Releases provider resources, clears all discovery state and
    /// invalidates queued events. Returns whether anything was active.
    fn shutdown(&mut self) -> bool {
        let was_active = self.browse.is_some()
            || self.resolving.is_some()
            || !self.pending.is_empty()
            || !self.registry.is_empty();

        if let Some(handle) = self.browse.take() {
            self.provider.browse_stop(handle);
        }
        if let Some(inflight) = self.resolving.take() {
            self.provider.resolve_stop(inflight.handle);
        }
        self.pending.clear();
        self.registry.clear();
        self.session += 1;
        was_active
    }
}

/// Discovers service instances of one type on the local network.
///
/// The browser is single-threaded by design: all state changes and all
/// observer callbacks happen inside [`poll()`](ServiceBrowser::poll) on
/// the calling thread, no matter which threads the provider uses.
pub struct ServiceBrowser {
    bridge: EventBridge<BrowserCore>,
    core: BrowserCore,
}

impl ServiceBrowser {
    pub fn new(provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self::with_config(provider, &EngineConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DiscoveryProvider>, config: &EngineConfig) -> Self {
        let bridge = EventBridge::new(config.bridge_capacity);
        let sender = bridge.sender();
        ServiceBrowser {
            bridge,
            core: BrowserCore {
                provider,
                sender,
                session: 0,
                browse: None,
                service_type: String::new(),
                registry: HashMap::new(),
                pending: VecDeque::new(),
                resolving: None,
                next_resolve_op: 0,
                added: ObserverList::new(),
                updated: ObserverList::new(),
                removed: ObserverList::new(),
                errors: ObserverList::new(),
            },
        }
    }

    /// Begins browsing for `service_type` (e.g. `_http._tcp`).
    ///
    /// Fails with [`Error::AlreadyRunning`] while a browse is active and
    /// with [`Error::BrowseFailed`] if the provider cannot start one.
    pub fn start(&mut self, service_type: &str) -> Result<()> {
        if self.core.browse.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let events = BrowseEvents {
            sender: self.core.sender.clone(),
            session: self.core.session,
        };
        let handle = self.core.provider.browse_start(service_type, events)?;
        self.core.browse = Some(handle);
        self.core.service_type = service_type.to_string();
        info!("browsing for '{service_type}'");
        Ok(())
    }

    /// Stops browsing, cancels any in-flight resolve and clears the
    /// registry. Events still queued from the stopped session are
    /// discarded on the next `poll()`. Idempotent.
    pub fn stop(&mut self) {
        if self.core.shutdown() {
            info!("browse for '{}' stopped", self.core.service_type);
        }
    }

    /// Applies all queued provider events and fires observers. Returns
    /// the number of events processed. Never blocks.
    pub fn poll(&mut self) -> usize {
        self.bridge.drain(&mut self.core)
    }

    pub fn is_running(&self) -> bool {
        self.core.browse.is_some()
    }

    /// Snapshot of all currently known instances.
    pub fn services(&self) -> Vec<ServiceRecord> {
        self.core.registry.values().cloned().collect()
    }

    /// Looks up one instance by name and interface.
    pub fn get(&self, name: &str, interface: u32) -> Option<&ServiceRecord> {
        self.core.registry.get(&InstanceKey::new(name, interface))
    }

    /// Number of provider events dropped due to bridge overflow.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.overflow_count()
    }

    pub fn connect_service_added<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ServiceRecord) + Send + 'static,
    {
        self.core.added.connect(handler)
    }

    pub fn connect_service_updated<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ServiceRecord) + Send + 'static,
    {
        self.core.updated.connect(handler)
    }

    pub fn connect_service_removed<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ServiceRecord) + Send + 'static,
    {
        self.core.removed.connect(handler)
    }

    pub fn connect_error<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Error) + Send + 'static,
    {
        self.core.errors.connect(handler)
    }

    /// Removes a previously connected handler.
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        self.core.added.disconnect(id)
            || self.core.updated.disconnect(id)
            || self.core.removed.disconnect(id)
            || self.core.errors.disconnect(id)
    }
}

impl Drop for ServiceBrowser {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

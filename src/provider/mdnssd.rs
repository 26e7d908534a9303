//! # mDNS provider
//!
//! [`DiscoveryProvider`] backend on top of the `mdns-sd` daemon.
//!
//! The daemon resolves instances on its own as part of browsing, so this
//! adapter keeps the endpoints it has seen per instance and answers
//! engine resolve requests from that store; a request for an instance
//! the daemon has not resolved yet is parked and answered when the
//! resolution arrives, or failed once its deadline
//! (`EngineConfig::resolve_timeout_ms`) passes, so the serialized
//! pipeline is never stuck behind an instance the daemon cannot resolve.
//! Daemon events are received by one supervised worker thread per browse
//! session, using bounded waits so the worker can be joined promptly on
//! stop.
//!
//! Mapping notes:
//! - The daemon does not report interface indexes; every instance is
//!   reported on index 0.
//! - A registration reaches `Established` as soon as the daemon accepts
//!   the committed records. The daemon defends the name with probing but
//!   does not report collisions back, so this backend never raises
//!   `Collision`.
//! - Browse domains are mapped to the `local` domain the daemon serves.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use log::{debug, warn};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::browser::{BrowseEvents, ResolveEvents};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::provider::worker::SupervisedWorker;
use crate::provider::{BrowseHandle, DiscoveryProvider, GroupHandle, GroupState, ResolveHandle};
use crate::publisher::GroupEvents;
use crate::record::{Candidate, Protocol, PublishRequest};

/// The daemon has no notion of interface indexes.
const DEFAULT_INTERFACE: u32 = 0;

#[derive(Clone)]
struct ResolvedEndpoint {
    host: String,
    address: String,
    port: u16,
    protocol: Protocol,
}

/// A resolve request waiting for the daemon to resolve its instance.
/// Failed once `deadline` passes without a resolution.
struct Parked {
    handle: ResolveHandle,
    name: String,
    events: ResolveEvents,
    deadline: Instant,
}

#[derive(Default)]
struct BrowseShared {
    /// Last endpoint the daemon reported per instance name.
    resolved: HashMap<String, ResolvedEndpoint>,
    parked: Vec<Parked>,
}

struct BrowseSession {
    handle: BrowseHandle,
    ty_domain: String,
    worker: SupervisedWorker,
    shared: Arc<Mutex<BrowseShared>>,
}

struct PublishSession {
    handle: GroupHandle,
    fullname: String,
}

#[derive(Default)]
struct Inner {
    browse: Option<BrowseSession>,
    publish: Option<PublishSession>,
}

/// mDNS-SD backend. One instance owns one daemon and supports one
/// browse session and one registration at a time.
pub struct MdnsSdProvider {
    daemon: ServiceDaemon,
    poll: Duration,
    resolve_timeout: Duration,
    next_handle: AtomicU64,
    inner: Mutex<Inner>,
}

impl MdnsSdProvider {
    pub fn new() -> Result<Self> {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| Error::ProviderInit(e.to_string()))?;
        Ok(MdnsSdProvider {
            daemon,
            poll: Duration::from_millis(config.provider_poll_ms),
            resolve_timeout: Duration::from_millis(config.resolve_timeout_ms),
            next_handle: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        })
    }

    fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl DiscoveryProvider for MdnsSdProvider {
    fn browse_start(&self, service_type: &str, events: BrowseEvents) -> Result<BrowseHandle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.browse.is_some() {
            return Err(Error::BrowseFailed {
                service_type: service_type.to_string(),
                reason: "a browse session is already active".into(),
            });
        }

        let ty_domain = names::to_ty_domain(service_type, "");
        let receiver = self.daemon.browse(&ty_domain).map_err(|e| Error::BrowseFailed {
            service_type: service_type.to_string(),
            reason: e.to_string(),
        })?;

        let shared = Arc::new(Mutex::new(BrowseShared::default()));
        let worker_shared = Arc::clone(&shared);
        let worker_ty = ty_domain.clone();
        let poll = self.poll;
        let worker = match SupervisedWorker::spawn("mdns-browse", move |stop| {
            browse_loop(receiver, worker_ty, events, worker_shared, stop, poll);
        }) {
            Ok(worker) => worker,
            Err(error) => {
                // The daemon is already browsing with nobody listening.
                if let Err(e) = self.daemon.stop_browse(&ty_domain) {
                    warn!("stop_browse for {ty_domain} failed: {e}");
                }
                return Err(error);
            }
        };

        let handle = BrowseHandle(self.mint());
        inner.browse = Some(BrowseSession { handle, ty_domain, worker, shared });
        Ok(handle)
    }

    fn browse_stop(&self, handle: BrowseHandle) {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            inner.browse.take_if(|session| session.handle == handle)
        };
        let Some(mut session) = session else {
            debug!("browse_stop for unknown handle {handle:?}");
            return;
        };
        if let Err(e) = self.daemon.stop_browse(&session.ty_domain) {
            warn!("stop_browse for {} failed: {e}", session.ty_domain);
        }
        session.worker.stop();
    }

    fn resolve_start(&self, candidate: &Candidate, events: ResolveEvents) -> Result<ResolveHandle> {
        let inner = self.inner.lock().unwrap();
        let Some(session) = inner.browse.as_ref() else {
            return Err(Error::ResolveFailed {
                instance: candidate.key.name.clone(),
                reason: "no active browse session".into(),
            });
        };

        let handle = ResolveHandle(self.mint());
        let mut shared = session.shared.lock().unwrap();
        if let Some(endpoint) = shared.resolved.get(&candidate.key.name) {
            // Already resolved by the daemon, answer right away.
            events.resolved(&endpoint.host, &endpoint.address, endpoint.port, endpoint.protocol);
        } else {
            shared.parked.push(Parked {
                handle,
                name: candidate.key.name.clone(),
                events,
                deadline: Instant::now() + self.resolve_timeout,
            });
        }
        Ok(handle)
    }

    fn resolve_stop(&self, handle: ResolveHandle) {
        let inner = self.inner.lock().unwrap();
        if let Some(session) = inner.browse.as_ref() {
            session
                .shared
                .lock()
                .unwrap()
                .parked
                .retain(|parked| parked.handle != handle);
        }
    }

    fn publish_commit(&self, request: &PublishRequest, events: GroupEvents) -> Result<GroupHandle> {
        let mut inner = self.inner.lock().unwrap();
        if inner.publish.is_some() {
            return Err(Error::RegistrationFailed {
                reason: "a registration is already active".into(),
            });
        }

        let ty_domain = names::to_ty_domain(&request.service_type, &request.domain);
        let info = ServiceInfo::new(
            &ty_domain,
            &request.name,
            &request.name,
            "",
            request.port,
            HashMap::<String, String>::new(),
        )
        .map_err(|e| Error::RegistrationFailed { reason: e.to_string() })?;
        let fullname = info.get_fullname().to_string();

        self.daemon
            .register(info)
            .map_err(|e| Error::RegistrationFailed { reason: e.to_string() })?;
        debug!("registered {fullname}");

        let handle = GroupHandle(self.mint());
        inner.publish = Some(PublishSession { handle, fullname });
        // The daemon has accepted the committed records and announces
        // them from here on.
        events.state_changed(GroupState::Registering);
        events.state_changed(GroupState::Established);
        Ok(handle)
    }

    fn publish_release(&self, handle: GroupHandle) {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.publish.take_if(|session| session.handle == handle) else {
            debug!("publish_release for unknown handle {handle:?}");
            return;
        };
        match self.daemon.unregister(&session.fullname) {
            Ok(_) => debug!("unregistered {}", session.fullname),
            Err(e) => warn!("unregister of {} failed: {e}", session.fullname),
        }
    }
}

impl Drop for MdnsSdProvider {
    fn drop(&mut self) {
        // Join a still-running browse worker before the daemon goes away.
        let session = self.inner.lock().unwrap().browse.take();
        if let Some(mut session) = session {
            let _ = self.daemon.stop_browse(&session.ty_domain);
            session.worker.stop();
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!("mdns daemon shutdown: {e}");
        }
    }
}

/// Receives daemon events for one browse session until stopped.
fn browse_loop(
    receiver: flume::Receiver<ServiceEvent>,
    ty_domain: String,
    events: BrowseEvents,
    shared: Arc<Mutex<BrowseShared>>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) {
    let (service_type, domain) = names::split_type(&ty_domain);
    while !stop.load(Ordering::SeqCst) {
        match receiver.recv_timeout(poll) {
            Ok(ServiceEvent::ServiceFound(_, fullname)) => {
                let name = names::instance_name(&fullname, &ty_domain);
                debug!("daemon announced '{name}'");
                events.instance_found(&name, &service_type, &domain, DEFAULT_INTERFACE);
            }
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let name = names::instance_name(info.get_fullname(), &ty_domain);
                let endpoint = endpoint_of(&info);
                debug!("daemon resolved '{name}' to {}:{}", endpoint.address, endpoint.port);

                let ready = {
                    let mut shared = shared.lock().unwrap();
                    shared.resolved.insert(name.clone(), endpoint.clone());
                    let (ready, waiting): (Vec<Parked>, Vec<Parked>) = shared
                        .parked
                        .drain(..)
                        .partition(|parked| parked.name == name);
                    shared.parked = waiting;
                    ready
                };
                for parked in ready {
                    parked.events.resolved(
                        &endpoint.host,
                        &endpoint.address,
                        endpoint.port,
                        endpoint.protocol,
                    );
                }
            }
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                let name = names::instance_name(&fullname, &ty_domain);
                debug!("daemon withdrew '{name}'");
                shared.lock().unwrap().resolved.remove(&name);
                events.instance_removed(&name, DEFAULT_INTERFACE);
            }
            Ok(other) => debug!("daemon event: {other:?}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if !stop.load(Ordering::SeqCst) {
                    events.browse_failed("mdns daemon channel closed");
                }
                break;
            }
        }
        fail_expired_resolves(&shared);
    }
}

/// Fails parked requests whose deadline has passed. Without this a
/// request for an instance the daemon never resolves would park forever
/// and, resolves being serialized, block every candidate behind it.
fn fail_expired_resolves(shared: &Mutex<BrowseShared>) {
    let now = Instant::now();
    let expired = {
        let mut shared = shared.lock().unwrap();
        if shared.parked.is_empty() {
            return;
        }
        let (expired, waiting): (Vec<Parked>, Vec<Parked>) = shared
            .parked
            .drain(..)
            .partition(|parked| now >= parked.deadline);
        shared.parked = waiting;
        expired
    };
    for parked in expired {
        warn!("resolve of '{}' timed out", parked.name);
        parked.events.failed("resolve timed out");
    }
}

/// Picks the endpoint to report for a resolved instance, preferring an
/// IPv4 address when the daemon found several.
fn endpoint_of(info: &ServiceInfo) -> ResolvedEndpoint {
    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    let preferred = addresses
        .iter()
        .find(|address| address.is_ipv4())
        .or_else(|| addresses.first())
        .copied();
    let (protocol, address) = match preferred {
        Some(address @ IpAddr::V4(_)) => (Protocol::V4, address.to_string()),
        Some(address @ IpAddr::V6(_)) => (Protocol::V6, address.to_string()),
        None => (Protocol::Unspecified, String::new()),
    };
    ResolvedEndpoint {
        host: info.get_hostname().to_string(),
        address,
        port: info.get_port(),
        protocol,
    }
}

/// Conversions between the crate's (type, domain) split and the
/// `<type>.<domain>.` strings the daemon speaks.
mod names {
    /// Builds the full browse/registration type. An empty domain maps
    /// to `local`; a type that already carries the domain is kept.
    pub fn to_ty_domain(service_type: &str, domain: &str) -> String {
        let trimmed = service_type.trim_end_matches('.');
        let domain = {
            let domain = domain.trim_matches('.');
            if domain.is_empty() { "local" } else { domain }
        };
        if trimmed.ends_with(&format!(".{domain}")) {
            format!("{trimmed}.")
        } else {
            format!("{trimmed}.{domain}.")
        }
    }

    /// Extracts the instance name from a fullname such as
    /// `printer1._http._tcp.local.`.
    pub fn instance_name(fullname: &str, ty_domain: &str) -> String {
        fullname
            .strip_suffix(ty_domain)
            .map(|name| name.trim_end_matches('.'))
            .unwrap_or(fullname)
            .to_string()
    }

    /// Splits `_http._tcp.local.` into (`_http._tcp`, `local`).
    pub fn split_type(ty_domain: &str) -> (String, String) {
        for marker in ["._tcp.", "._udp."] {
            if let Some(position) = ty_domain.find(marker) {
                let service_type = ty_domain[..position + marker.len() - 1].to_string();
                let rest = ty_domain[position + marker.len()..].trim_end_matches('.');
                let domain = if rest.is_empty() { "local" } else { rest };
                return (service_type, domain.to_string());
            }
        }
        (ty_domain.trim_end_matches('.').to_string(), "local".to_string())
    }
}

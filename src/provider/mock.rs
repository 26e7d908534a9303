//! Scripted in-memory provider for tests and offline development.
//!
//! The mock performs no network activity. Tests drive it explicitly:
//! a call such as [`MockProvider::announce`] fires the stored callback
//! context exactly like a real backend thread would, and the engine
//! picks the event up on its next `poll()`. All provider calls are
//! counted so tests can assert that every started operation is released.
//!
//! ```ignore
//! let provider = Arc::new(MockProvider::new());
//! let mut browser = ServiceBrowser::new(provider.clone());
//! browser.start("_http._tcp")?;
//! provider.announce("printer1", "_http._tcp", "local", 3);
//! browser.poll(); // browser starts resolving printer1
//! provider.complete_resolve("printer1.local", "192.168.1.5", 9100, Protocol::V4);
//! browser.poll(); // ServiceAdded fires
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::browser::{BrowseEvents, ResolveEvents};
use crate::error::{Error, Result};
use crate::provider::{BrowseHandle, DiscoveryProvider, GroupHandle, GroupState, ResolveHandle};
use crate::publisher::GroupEvents;
use crate::record::{Candidate, Protocol, PublishRequest};

struct ActiveBrowse {
    handle: BrowseHandle,
    events: BrowseEvents,
}

struct ActiveResolve {
    handle: ResolveHandle,
    candidate: Candidate,
    events: ResolveEvents,
}

struct ActiveGroup {
    handle: GroupHandle,
    events: GroupEvents,
}

#[derive(Default)]
struct MockState {
    browse: Option<ActiveBrowse>,
    browse_starts: Vec<String>,
    browse_stops: u64,
    resolves: Vec<ActiveResolve>,
    resolve_starts: u64,
    resolve_stops: u64,
    group: Option<ActiveGroup>,
    commits: Vec<PublishRequest>,
    publish_releases: u64,
    fail_browse_start: bool,
    fail_resolve_start: bool,
    fail_publish_commit: bool,
}

/// Backend double that replays whatever the test scripts.
///
/// Supports one browse session and one registration group at a time,
/// which is all the engines ever hold. Driver methods panic when called
/// without the operation they refer to, so a misordered script fails
/// loudly instead of silently doing nothing.
pub struct MockProvider {
    next_handle: AtomicU64,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider {
            next_handle: AtomicU64::new(1),
            state: Mutex::new(MockState::default()),
        }
    }

    fn mint(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    // --- scripting -------------------------------------------------

    /// Announces an instance on the active browse session.
    pub fn announce(&self, name: &str, service_type: &str, domain: &str, interface: u32) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .browse
                .as_ref()
                .expect("announce() requires an active browse")
                .events
                .clone()
        };
        events.instance_found(name, service_type, domain, interface);
    }

    /// Withdraws an instance on the active browse session.
    pub fn remove(&self, name: &str, interface: u32) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .browse
                .as_ref()
                .expect("remove() requires an active browse")
                .events
                .clone()
        };
        events.instance_removed(name, interface);
    }

    /// Fails the active browse session.
    pub fn fail_browse(&self, reason: &str) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .browse
                .as_ref()
                .expect("fail_browse() requires an active browse")
                .events
                .clone()
        };
        events.browse_failed(reason);
    }

    /// Completes the oldest resolve still in flight.
    pub fn complete_resolve(&self, host: &str, address: &str, port: u16, protocol: Protocol) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .resolves
                .first()
                .expect("complete_resolve() requires a resolve in flight")
                .events
                .clone()
        };
        events.resolved(host, address, port, protocol);
    }

    /// Fails the oldest resolve still in flight.
    pub fn fail_resolve(&self, reason: &str) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .resolves
                .first()
                .expect("fail_resolve() requires a resolve in flight")
                .events
                .clone()
        };
        events.failed(reason);
    }

    /// Reports a lifecycle transition on the active registration group.
    pub fn group_transition(&self, group_state: GroupState) {
        let events = {
            let state = self.state.lock().unwrap();
            state
                .group
                .as_ref()
                .expect("group_transition() requires an active registration")
                .events
                .clone()
        };
        events.state_changed(group_state);
    }

    // --- failure injection -----------------------------------------

    /// Makes the next `browse_start` calls fail synchronously.
    pub fn set_fail_browse_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_browse_start = fail;
    }

    /// Makes the next `resolve_start` calls fail synchronously.
    pub fn set_fail_resolve_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_resolve_start = fail;
    }

    /// Makes the next `publish_commit` calls fail synchronously.
    pub fn set_fail_publish_commit(&self, fail: bool) {
        self.state.lock().unwrap().fail_publish_commit = fail;
    }

    // --- accounting ------------------------------------------------

    /// Service types handed to `browse_start`, in call order.
    pub fn browse_starts(&self) -> Vec<String> {
        self.state.lock().unwrap().browse_starts.clone()
    }

    pub fn browse_stops(&self) -> u64 {
        self.state.lock().unwrap().browse_stops
    }

    pub fn resolve_starts(&self) -> u64 {
        self.state.lock().unwrap().resolve_starts
    }

    pub fn resolve_stops(&self) -> u64 {
        self.state.lock().unwrap().resolve_stops
    }

    /// Resolves started but neither completed-and-released nor cancelled.
    pub fn active_resolves(&self) -> usize {
        self.state.lock().unwrap().resolves.len()
    }

    /// Candidate of the oldest resolve in flight.
    pub fn resolving(&self) -> Option<Candidate> {
        let state = self.state.lock().unwrap();
        state.resolves.first().map(|resolve| resolve.candidate.clone())
    }

    /// Requests handed to `publish_commit`, in call order.
    pub fn committed(&self) -> Vec<PublishRequest> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn publish_commits(&self) -> u64 {
        self.state.lock().unwrap().commits.len() as u64
    }

    pub fn publish_releases(&self) -> u64 {
        self.state.lock().unwrap().publish_releases
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryProvider for MockProvider {
    fn browse_start(&self, service_type: &str, events: BrowseEvents) -> Result<BrowseHandle> {
        let mut state = self.state.lock().unwrap();
        state.browse_starts.push(service_type.to_string());
        if state.fail_browse_start {
            return Err(Error::BrowseFailed {
                service_type: service_type.to_string(),
                reason: "mock backend refused to browse".into(),
            });
        }
        let handle = BrowseHandle(self.mint());
        state.browse = Some(ActiveBrowse { handle, events });
        Ok(handle)
    }

    fn browse_stop(&self, handle: BrowseHandle) {
        let mut state = self.state.lock().unwrap();
        state.browse_stops += 1;
        if state.browse.as_ref().is_some_and(|browse| browse.handle == handle) {
            state.browse = None;
        }
    }

    fn resolve_start(&self, candidate: &Candidate, events: ResolveEvents) -> Result<ResolveHandle> {
        let mut state = self.state.lock().unwrap();
        state.resolve_starts += 1;
        if state.fail_resolve_start {
            return Err(Error::ResolveFailed {
                instance: candidate.key.name.clone(),
                reason: "mock backend refused to resolve".into(),
            });
        }
        let handle = ResolveHandle(self.mint());
        state.resolves.push(ActiveResolve {
            handle,
            candidate: candidate.clone(),
            events,
        });
        Ok(handle)
    }

    fn resolve_stop(&self, handle: ResolveHandle) {
        let mut state = self.state.lock().unwrap();
        state.resolve_stops += 1;
        state.resolves.retain(|resolve| resolve.handle != handle);
    }

    fn publish_commit(&self, request: &PublishRequest, events: GroupEvents) -> Result<GroupHandle> {
        let mut state = self.state.lock().unwrap();
        state.commits.push(request.clone());
        if state.fail_publish_commit {
            return Err(Error::RegistrationFailed {
                reason: "mock backend rejected the registration".into(),
            });
        }
        let handle = GroupHandle(self.mint());
        state.group = Some(ActiveGroup { handle, events });
        Ok(handle)
    }

    fn publish_release(&self, handle: GroupHandle) {
        let mut state = self.state.lock().unwrap();
        state.publish_releases += 1;
        if state.group.as_ref().is_some_and(|group| group.handle == handle) {
            state.group = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let provider = MockProvider::new();
        let a = provider.mint();
        let b = provider.mint();
        assert_ne!(a, b);
    }

    #[test]
    fn test_injected_browse_failure_counts_the_attempt() {
        let provider = MockProvider::new();
        provider.set_fail_browse_start(true);
        // The attempt is recorded even though no session is created.
        // (Checked through the engine in the browser tests; here we only
        // verify the flag wiring.)
        let state = provider.state.lock().unwrap();
        assert!(state.fail_browse_start);
        assert!(state.browse.is_none());
    }
}

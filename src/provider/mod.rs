//! # Provider Adapter
//!
//! Boundary between the poll-driven engines and a concrete discovery
//! backend. Backends implement [`DiscoveryProvider`] and report results
//! through the event contexts they were handed at start time; they never
//! touch engine state directly.
//!
//! Two implementations ship with the crate:
//! - [`MdnsSdProvider`]: mDNS-SD via the `mdns-sd` daemon (feature `mdns`).
//! - [`MockProvider`]: scripted backend for tests and offline development.

pub mod mock;
pub mod worker;

#[cfg(feature = "mdns")]
pub mod mdnssd;

pub use mock::*;
pub use worker::*;

#[cfg(feature = "mdns")]
pub use mdnssd::*;

use std::fmt;

use crate::browser::{BrowseEvents, ResolveEvents};
use crate::error::Result;
use crate::publisher::GroupEvents;
use crate::record::{Candidate, PublishRequest};

/// Identifies one browse operation at the backend. The value is minted by
/// the backend and handed back verbatim on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowseHandle(pub u64);

/// Identifies one resolve operation at the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolveHandle(pub u64);

/// Identifies one registration group at the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u64);

/// Lifecycle of a registration group as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Group exists, nothing committed yet.
    Uncommitted,
    /// Records are committed and being announced to the network.
    Registering,
    /// The registration is live.
    Established,
    /// Another host already announces this name.
    Collision,
    /// The backend gave up on the registration.
    Failure,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GroupState::Uncommitted => "uncommitted",
            GroupState::Registering => "registering",
            GroupState::Established => "established",
            GroupState::Collision => "collision",
            GroupState::Failure => "failure",
        };
        write!(f, "{text}")
    }
}

/// A pluggable discovery backend.
///
/// Designed to be object-safe and shared behind an `Arc` (e.g. for mDNS,
/// a future DNS-SD daemon, or mocking in tests). All methods are called
/// from the engine's polling thread; results flow back through the event
/// contexts, which may be used from any thread the backend runs
/// callbacks on.
///
/// Every `*_start`/`*_commit` that returns `Ok` hands out a handle the
/// engine later returns through the matching stop/release call, exactly
/// once.
pub trait DiscoveryProvider: Send + Sync {
    /// Starts browsing for `service_type`. Announcements and losses are
    /// reported through `events` until the handle is stopped.
    fn browse_start(&self, service_type: &str, events: BrowseEvents) -> Result<BrowseHandle>;

    /// Stops a browse operation. Events already in flight may still be
    /// delivered; the engine discards them by session.
    fn browse_stop(&self, handle: BrowseHandle);

    /// Starts resolving one announced instance to host/address/port.
    /// The outcome arrives through `events`.
    fn resolve_start(&self, candidate: &Candidate, events: ResolveEvents) -> Result<ResolveHandle>;

    /// Releases a resolve operation, finished or not.
    fn resolve_stop(&self, handle: ResolveHandle);

    /// Registers `request` with the backend and commits it. Group
    /// lifecycle transitions arrive through `events`.
    fn publish_commit(&self, request: &PublishRequest, events: GroupEvents) -> Result<GroupHandle>;

    /// Withdraws a registration group.
    fn publish_release(&self, handle: GroupHandle);
}

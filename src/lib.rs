//! # zeroconf-bridge
//!
//! Bridges an asynchronous, callback-driven service discovery backend
//! (mDNS-SD style) into a single-threaded, poll-driven API.
//!
//! Backend callbacks fire on provider-owned threads; everything they
//! report is copied into closures and queued on a bounded event bridge.
//! The application drains that bridge by calling `poll()` from its own
//! loop, so registry state and observer callbacks always live on one
//! thread and never need a lock.
//!
//! ## Key Types
//! - [`ServiceBrowser`]: discovers and resolves instances of a service
//!   type, keeps a deduplicated registry keyed by name and interface.
//! - [`ServicePublisher`]: registers one service instance and tracks
//!   the commit/collision lifecycle.
//! - [`DiscoveryProvider`]: the backend seam. [`MdnsSdProvider`] talks
//!   to a real mDNS daemon, [`MockProvider`] replays scripted events.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zeroconf_bridge::{MdnsSdProvider, ServiceBrowser};
//!
//! let provider = Arc::new(MdnsSdProvider::new()?);
//! let mut browser = ServiceBrowser::new(provider);
//! browser.connect_service_added(|record| println!("+ {record}"));
//! browser.connect_service_removed(|record| println!("- {record}"));
//! browser.start("_http._tcp")?;
//! loop {
//!     browser.poll();
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! ```

pub mod bridge;
pub mod browser;
pub mod config;
pub mod error;
pub mod observer;
pub mod provider;
pub mod publisher;
pub mod record;

pub use bridge::{BridgeSender, EventBridge};
pub use browser::{BrowseEvents, ResolveEvents, ServiceBrowser};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use observer::{HandlerId, ObserverList};
pub use provider::{
    BrowseHandle, DiscoveryProvider, GroupHandle, GroupState, MockProvider, ResolveHandle,
    SupervisedWorker,
};
pub use publisher::{GroupEvents, ServicePublisher};
pub use record::{Candidate, InstanceKey, Protocol, PublishRequest, ServiceRecord};

#[cfg(feature = "mdns")]
pub use provider::MdnsSdProvider;

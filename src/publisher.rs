//! # Service Publisher
//!
//! Poll-driven publish engine. One registration is active at a time and
//! runs through the provider's group lifecycle: committed records are
//! announced (`Registering`) until the network either accepts them
//! (`Established`), reports the name as taken (`Collision`) or gives up
//! (`Failure`). Collision and failure withdraw the registration and
//! leave the publisher inactive; renaming and retrying is up to the
//! caller, the engine never retries on its own.
//!
//! As with the browser, provider events are applied and observers fired
//! only inside [`ServicePublisher::poll`].

use std::sync::Arc;

use log::{debug, info, warn};

use crate::bridge::{BridgeSender, EventBridge};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::observer::{HandlerId, ObserverList};
use crate::provider::{DiscoveryProvider, GroupHandle, GroupState};
use crate::record::PublishRequest;

/// Callback context handed to the provider for one registration group.
/// May be used from any provider thread; transitions reported after the
/// registration was released are discarded.
#[derive(Clone)]
pub struct GroupEvents {
    sender: BridgeSender<PublisherCore>,
    session: u64,
}

impl GroupEvents {
    /// Reports a group lifecycle transition.
    pub fn state_changed(&self, state: GroupState) {
        let session = self.session;
        self.sender.push(move |core: &mut PublisherCore| {
            if core.session != session {
                debug!("ignoring group state '{state}' from a released registration");
                return;
            }
            core.on_group_state(state);
        });
    }
}

/// Engine state. Owned by [`ServicePublisher`] and mutated only by the
/// polling thread.
struct PublisherCore {
    provider: Arc<dyn DiscoveryProvider>,
    session: u64,
    group: Option<GroupHandle>,
    request: Option<PublishRequest>,
    published: ObserverList<PublishRequest>,
    errors: ObserverList<Error>,
}

impl PublisherCore {
    fn on_group_state(&mut self, state: GroupState) {
        if self.group.is_none() {
            debug!("group state '{state}' with no active registration");
            return;
        }
        match state {
            GroupState::Uncommitted => debug!("registration group created"),
            GroupState::Registering => debug!("registration committed, announcing"),
            GroupState::Established => {
                if let Some(request) = self.request.clone() {
                    info!("service published: {request}");
                    self.published.emit(&request);
                }
            }
            GroupState::Collision => {
                let name = self
                    .request
                    .as_ref()
                    .map(|request| request.name.clone())
                    .unwrap_or_default();
                warn!("publish of '{name}' hit a name collision");
                self.shutdown();
                self.errors.emit(&Error::NameCollision { name });
            }
            GroupState::Failure => {
                warn!("registration group failed");
                self.shutdown();
                self.errors.emit(&Error::RegistrationFailed {
                    reason: "registration group entered failure state".into(),
                });
            }
        }
    }

    /// Withdraws the registration and invalidates queued group events.
    /// Returns whether one was active.
    fn shutdown(&mut self) -> bool {
        let was_active = self.group.is_some();
        if let Some(handle) = self.group.take() {
            self.provider.publish_release(handle);
        }
        self.request = None;
        self.session += 1;
        was_active
    }
}

/// Publishes one service instance on the local network.
pub struct ServicePublisher {
    bridge: EventBridge<PublisherCore>,
    core: PublisherCore,
}

impl ServicePublisher {
    pub fn new(provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self::with_config(provider, &EngineConfig::default())
    }

    pub fn with_config(provider: Arc<dyn DiscoveryProvider>, config: &EngineConfig) -> Self {
        let bridge = EventBridge::new(config.bridge_capacity);
        ServicePublisher {
            bridge,
            core: PublisherCore {
                provider,
                session: 0,
                group: None,
                request: None,
                published: ObserverList::new(),
                errors: ObserverList::new(),
            },
        }
    }

    /// Registers `name` of `service_type` in `domain` on `port` and
    /// starts announcing it.
    ///
    /// Fails with [`Error::RegistrationFailed`] if a publish is already
    /// active (the active one is left untouched) or if the provider
    /// rejects the registration outright. The success of an accepted
    /// registration is reported later through the published observers.
    pub fn start(&mut self, name: &str, service_type: &str, domain: &str, port: u16) -> Result<()> {
        if self.core.group.is_some() {
            return Err(Error::RegistrationFailed {
                reason: "a publish operation is already active".into(),
            });
        }
        let request = PublishRequest::new(name, service_type, domain, port);
        let events = GroupEvents {
            sender: self.bridge.sender(),
            session: self.core.session,
        };
        let handle = self.core.provider.publish_commit(&request, events)?;
        info!("publishing {request}");
        self.core.group = Some(handle);
        self.core.request = Some(request);
        Ok(())
    }

    /// Withdraws the registration, if any. Idempotent.
    pub fn stop(&mut self) {
        if self.core.shutdown() {
            info!("publication withdrawn");
        }
    }

    /// Applies all queued provider events and fires observers. Returns
    /// the number of events processed. Never blocks.
    pub fn poll(&mut self) -> usize {
        self.bridge.drain(&mut self.core)
    }

    /// Whether a registration is currently held at the provider.
    pub fn is_active(&self) -> bool {
        self.core.group.is_some()
    }

    /// The request being published, while one is active.
    pub fn current(&self) -> Option<&PublishRequest> {
        self.core.request.as_ref()
    }

    /// Number of provider events dropped due to bridge overflow.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.overflow_count()
    }

    pub fn connect_service_published<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&PublishRequest) + Send + 'static,
    {
        self.core.published.connect(handler)
    }

    pub fn connect_error<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Error) + Send + 'static,
    {
        self.core.errors.connect(handler)
    }

    /// Removes a previously connected handler.
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        self.core.published.disconnect(id) || self.core.errors.disconnect(id)
    }
}

impl Drop for ServicePublisher {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_initial_state_is_inactive() {
        let publisher = ServicePublisher::new(Arc::new(MockProvider::new()));
        assert!(!publisher.is_active());
        assert!(publisher.current().is_none());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut publisher = ServicePublisher::new(Arc::new(MockProvider::new()));
        publisher.stop();
        publisher.stop();
        assert_eq!(publisher.poll(), 0);
    }

    #[test]
    fn test_start_reaches_provider_and_stop_releases() {
        let provider = Arc::new(MockProvider::new());
        let mut publisher = ServicePublisher::new(provider.clone());
        publisher.start("MyPrinter", "_ipp._tcp", "local", 631).unwrap();
        assert!(publisher.is_active());
        assert_eq!(provider.publish_commits(), 1);
        publisher.stop();
        assert!(!publisher.is_active());
        assert_eq!(provider.publish_releases(), 1);
    }
}

//! Core data model for discovered and published services.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address family of a resolved service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    V4,
    V6,
    #[default]
    Unspecified,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::V4 => write!(f, "IPv4"),
            Protocol::V6 => write!(f, "IPv6"),
            Protocol::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Identity of one service instance within a browse session.
///
/// Instance names are only unique per network interface, so the interface
/// index is part of the key. Keeping it a typed field (rather than folding
/// it into the name string) means `("printer1", 23)` and `("printer12", 3)`
/// can never alias each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub name: String,
    pub interface: u32,
}

impl InstanceKey {
    pub fn new(name: impl Into<String>, interface: u32) -> Self {
        Self { name: name.into(), interface }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@if{}", self.name, self.interface)
    }
}

/// A discovered instance that has been announced but not yet resolved.
///
/// Candidates carry only what the announcement provided; host, address and
/// port are filled in by a later resolve step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: InstanceKey,
    pub service_type: String,
    pub domain: String,
}

impl Candidate {
    pub fn new(key: InstanceKey, service_type: impl Into<String>, domain: impl Into<String>) -> Self {
        Self { key, service_type: service_type.into(), domain: domain.into() }
    }
}

/// A fully resolved service instance as exposed by the browser registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Instance name, e.g. `printer1`.
    pub name: String,
    /// Service type, e.g. `_http._tcp`.
    pub service_type: String,
    /// Browse domain, typically `local`.
    pub domain: String,
    /// Hostname of the machine announcing the service.
    pub host: String,
    /// Address family of `address`.
    pub protocol: Protocol,
    /// Textual network address, e.g. `192.168.1.5`.
    pub address: String,
    /// Index of the interface the announcement arrived on.
    pub interface: u32,
    /// Service port.
    pub port: u16,
}

impl ServiceRecord {
    /// Registry key for this record.
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.name.clone(), self.interface)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}.{}) at {}:{} [{}, if{}]",
            self.name, self.service_type, self.domain, self.address, self.port, self.protocol, self.interface
        )
    }
}

/// Parameters of a service registration handed to the publish engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub port: u16,
}

impl PublishRequest {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        domain: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            domain: domain.into(),
            port,
        }
    }
}

impl fmt::Display for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}.{}) on port {}", self.name, self.service_type, self.domain, self.port)
    }
}

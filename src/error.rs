//! Error types for the discovery and publish engines.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the engines and provider backends.
///
/// Synchronous failures come back as `Err` from the call that caused them.
/// Asynchronous failures (reported by the provider after the call returned)
/// are delivered through the error observers during `poll()`. A single
/// failure is reported on exactly one of those paths, never both.
#[derive(Debug, Error)]
pub enum Error {
    /// `start()` was called on a browser that is already browsing.
    #[error("browser is already running")]
    AlreadyRunning,

    /// The provider could not start or sustain a browse operation.
    #[error("browse for '{service_type}' failed: {reason}")]
    BrowseFailed { service_type: String, reason: String },

    /// A resolve operation failed for one discovered instance.
    #[error("resolve of '{instance}' failed: {reason}")]
    ResolveFailed { instance: String, reason: String },

    /// The provider rejected a registration, or an established one failed.
    #[error("service registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// Another host on the network already announces this instance name.
    #[error("service name '{name}' collides with an existing instance")]
    NameCollision { name: String },

    /// A provider backend could not be brought up.
    #[error("provider initialization failed: {0}")]
    ProviderInit(String),

    /// A configuration file or value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Engine tuning knobs.
/// All timing values are in milliseconds unless otherwise specified.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Capacity of the event bridge between provider threads and the
    /// polling thread (events, default: 64). Events beyond this are
    /// dropped, never blocked on.
    #[serde(default = "default_bridge_capacity")]
    pub bridge_capacity: usize,
    /// Longest interval a provider worker waits before rechecking its
    /// stop flag (ms, default: 200). Bounds shutdown latency.
    #[serde(default = "default_provider_poll")]
    pub provider_poll_ms: u64,
    /// Longest wait for one instance to resolve before the backend gives
    /// up on it (ms, default: 10000). A timed-out resolve is reported as
    /// failed and the pipeline moves on to the next candidate.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bridge_capacity: default_bridge_capacity(),
            provider_poll_ms: default_provider_poll(),
            resolve_timeout_ms: default_resolve_timeout(),
        }
    }
}

fn default_bridge_capacity() -> usize { 64 }
fn default_provider_poll() -> u64 { 200 }
fn default_resolve_timeout() -> u64 { 10_000 }

impl EngineConfig {
    /// Loads a configuration from a JSON file. Missing fields fall back
    /// to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: EngineConfig =
            serde_json::from_str(&text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.bridge_capacity == 0 {
            return Err(Error::InvalidConfig(
                "bridge_capacity must be at least 1".into(),
            ));
        }
        if self.provider_poll_ms == 0 {
            return Err(Error::InvalidConfig(
                "provider_poll_ms must be at least 1".into(),
            ));
        }
        if self.resolve_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "resolve_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.bridge_capacity, 64);
        assert_eq!(config.provider_poll_ms, 200);
        assert_eq!(config.resolve_timeout_ms, 10_000);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"bridge_capacity": 16}"#).unwrap();
        assert_eq!(config.bridge_capacity, 16);
        assert_eq!(config.provider_poll_ms, 200);
        assert_eq!(config.resolve_timeout_ms, 10_000);
    }

    #[test]
    fn test_empty_json_is_all_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bridge_capacity, 64);
        assert_eq!(config.provider_poll_ms, 200);
        assert_eq!(config.resolve_timeout_ms, 10_000);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config: EngineConfig = serde_json::from_str(r#"{"bridge_capacity": 0}"#).unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_resolve_timeout_rejected() {
        let config: EngineConfig = serde_json::from_str(r#"{"resolve_timeout_ms": 0}"#).unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EngineConfig::from_file("/nonexistent/engine.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

//! Server configuration, read from `SKETCHROOM_*` environment variables.
//!
//! Top-level fields map directly (`SKETCHROOM_PORT=9000`). Relay tuning is
//! nested behind a double underscore (`SKETCHROOM_RELAY__HISTORY_LIMIT=50`).
//! Anything unset keeps its default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sketchroom_core::RelayConfig;

use crate::error::ConfigError;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "SKETCHROOM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; 0 picks a free one.
    pub port: u16,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_message_size: 1024 * 1024,
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment, reading a `.env` file first if
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load(environment())
    }

    /// Load from an explicit set of variables instead of the process
    /// environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(environment().source(Some(vars)))
    }

    fn load(source: ::config::Environment) -> Result<Self, ConfigError> {
        let config: Self = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = self.relay.min_outbox_capacity();
        if self.relay.outbox_capacity < required {
            return Err(ConfigError::OutboxTooSmall {
                capacity: self.relay.outbox_capacity,
                required,
            });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }
        Ok(())
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = ServerConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = ServerConfig::from_vars(vars(&[
            ("SKETCHROOM_HOST", "127.0.0.1"),
            ("SKETCHROOM_PORT", "9001"),
            ("SKETCHROOM_RELAY__HISTORY_LIMIT", "0"),
            ("SKETCHROOM_RELAY__OUTBOX_CAPACITY", "32"),
        ]))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9001);
        assert_eq!(config.relay.history_limit, 0);
        assert_eq!(config.relay.outbox_capacity, 32);
        assert_eq!(config.max_message_size, 1024 * 1024);
    }

    #[test]
    fn test_single_underscore_fields_stay_top_level() {
        let config =
            ServerConfig::from_vars(vars(&[("SKETCHROOM_MAX_MESSAGE_SIZE", "4096")])).unwrap();
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn test_unrelated_variables_are_ignored() {
        let config = ServerConfig::from_vars(vars(&[("OTHER_PORT", "1")])).unwrap();
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = ServerConfig::from_vars(vars(&[("SKETCHROOM_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)), "got {err:?}");
    }

    #[test]
    fn test_outbox_smaller_than_replay_is_rejected() {
        let err = ServerConfig::from_vars(vars(&[
            ("SKETCHROOM_RELAY__HISTORY_LIMIT", "10"),
            ("SKETCHROOM_RELAY__OUTBOX_CAPACITY", "4"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutboxTooSmall {
                capacity: 4,
                required: 12
            }
        ));

        let err = ServerConfig::from_vars(vars(&[("SKETCHROOM_RELAY__OUTBOX_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutboxTooSmall { capacity: 0, .. }));
    }

    #[test]
    fn test_zero_message_size_is_rejected() {
        let err = ServerConfig::from_vars(vars(&[("SKETCHROOM_MAX_MESSAGE_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroMessageSize));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

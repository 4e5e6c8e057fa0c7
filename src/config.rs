//! Configuration for the device link and the trial controller.
//!
//! Both structs deserialize from JSON with every field optional, and can be
//! loaded from `CHRONO_*` environment variables.

use crate::core::{Core, MAX_PIN};
use crate::link::FirmwareVersion;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn parse_var<V>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    parse: impl Fn(&str) -> Result<V, String>,
) -> Result<Option<V>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => parse(value.trim())
            .map(Some)
            .map_err(|reason| ConfigError::InvalidVar {
                name,
                value,
                reason,
            }),
    }
}

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Settings used when opening a [`DeviceLink`](crate::link::DeviceLink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// FSM core every core-scoped command targets.
    pub core: Core,
    /// Oldest firmware accepted on open.
    pub min_firmware: FirmwareVersion,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            core: Core::One,
            min_firmware: FirmwareVersion::MIN_COMPATIBLE,
        }
    }
}

impl LinkConfig {
    pub fn with_core(mut self, core: Core) -> Self {
        self.core = core;
        self
    }

    pub fn with_min_firmware(mut self, min_firmware: FirmwareVersion) -> Self {
        self.min_firmware = min_firmware;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Recognised variables, all optional:
    /// - `CHRONO_CORE`: `1` or `2`
    /// - `CHRONO_MIN_FIRMWARE`: `major.minor`, e.g. `1.4`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(core) = parse_var(&lookup, "CHRONO_CORE", |v| match v {
            "1" => Ok(Core::One),
            "2" => Ok(Core::Two),
            _ => Err("expected 1 or 2".to_string()),
        })? {
            config.core = core;
        }
        if let Some(min_firmware) = parse_var(&lookup, "CHRONO_MIN_FIRMWARE", |v| {
            v.parse::<FirmwareVersion>()
        })? {
            config.min_firmware = min_firmware;
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Settings for [`TrialRunner`](crate::controller::TrialRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Bound on the busy-poll for sequence completion.
    pub finish_timeout_ms: u64,
    /// Pin the standard glitch program waits on.
    pub trigger_pin: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            finish_timeout_ms: 100,
            trigger_pin: 8,
        }
    }
}

impl ControllerConfig {
    pub fn with_finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_trigger_pin(mut self, pin: u8) -> Self {
        self.trigger_pin = pin;
        self
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_millis(self.finish_timeout_ms)
    }

    /// Create configuration from environment variables.
    ///
    /// Recognised variables, all optional:
    /// - `CHRONO_FINISH_TIMEOUT_MS`: poll bound in milliseconds
    /// - `CHRONO_TRIGGER_PIN`: 0 to 31
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, "CHRONO_FINISH_TIMEOUT_MS", |v| {
            v.parse::<u64>().map_err(|e| e.to_string())
        })? {
            config.finish_timeout_ms = ms;
        }
        if let Some(pin) = parse_var(&lookup, "CHRONO_TRIGGER_PIN", |v| {
            let pin = v.parse::<u8>().map_err(|e| e.to_string())?;
            if pin > MAX_PIN {
                return Err(format!("pin must be at most {MAX_PIN}"));
            }
            Ok(pin)
        })? {
            config.trigger_pin = pin;
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn link_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.core, Core::One);
        assert_eq!(config.min_firmware, FirmwareVersion::new(1, 4));
    }

    #[test]
    fn link_from_lookup() {
        let config = LinkConfig::from_lookup(vars(&[
            ("CHRONO_CORE", "2"),
            ("CHRONO_MIN_FIRMWARE", "1.6"),
        ]))
        .unwrap();
        assert_eq!(config.core, Core::Two);
        assert_eq!(config.min_firmware, FirmwareVersion::new(1, 6));
    }

    #[test]
    fn invalid_core_names_the_variable() {
        let err = LinkConfig::from_lookup(vars(&[("CHRONO_CORE", "3")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "CHRONO_CORE",
                ..
            }
        ));
    }

    #[test]
    fn controller_from_lookup() {
        let config = ControllerConfig::from_lookup(vars(&[
            ("CHRONO_FINISH_TIMEOUT_MS", "250"),
            ("CHRONO_TRIGGER_PIN", "3"),
        ]))
        .unwrap();
        assert_eq!(config.finish_timeout(), Duration::from_millis(250));
        assert_eq!(config.trigger_pin, 3);

        assert!(ControllerConfig::from_lookup(vars(&[("CHRONO_TRIGGER_PIN", "40")])).is_err());
    }

    #[test]
    fn json_fields_are_optional() {
        let config = ControllerConfig::from_json(r#"{"trigger_pin": 12}"#).unwrap();
        assert_eq!(config.trigger_pin, 12);
        assert_eq!(config.finish_timeout_ms, 100);

        let link = LinkConfig::from_json(r#"{"core": "Two"}"#).unwrap();
        assert_eq!(link.core, Core::Two);
        assert!(LinkConfig::from_json("{").is_err());
    }

    #[test]
    fn builders_override_defaults() {
        let config = ControllerConfig::default()
            .with_finish_timeout(Duration::from_secs(2))
            .with_trigger_pin(0);
        assert_eq!(config.finish_timeout_ms, 2000);
        assert_eq!(config.trigger_pin, 0);
    }
}

//! Runtime configuration.
//!
//! Settings come from `IGNITION_*` environment variables or a JSON document.
//! Everything has a default, so an empty source yields [`RuntimeConfig::default`].

use crate::di::ConflictPolicy;
use crate::error::IgnitionError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable prefix read by [`RuntimeConfig::from_env`].
pub const ENV_PREFIX: &str = "IGNITION_";

/// Configuration service
///
/// A snapshot of string key/value pairs, usually the process environment.
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let service = Self::default();
        for (key, value) in vars {
            service.config.insert(key.into(), value.into());
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty()
    }

    /// Parse `key` with `FromStr`. Missing keys and blank values yield `Ok(None)`.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, IgnitionError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|e| IgnitionError::InvalidConfig(format!("{key}={raw}: {e}")))
    }

    /// Like [`parse`](Self::parse) for booleans, also accepting `1`/`0`, `yes`/`no` and `on`/`off`.
    pub fn parse_flag(&self, key: &str) -> Result<Option<bool>, IgnitionError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(IgnitionError::InvalidConfig(format!(
                "{key}={other}: expected a boolean"
            ))),
        }
    }
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values may hold secrets.
        f.debug_struct("ConfigService")
            .field("keys", &self.config.len())
            .finish()
    }
}

/// Settings for a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// How duplicate binding keys are treated at commit.
    pub conflict_policy: ConflictPolicy,
    /// Deadline for each component's `start`, in milliseconds.
    pub start_timeout_ms: Option<u64>,
    /// Deadline for each component's `stop`, in milliseconds.
    pub stop_timeout_ms: Option<u64>,
    /// Whether `run_until_signal` listens for Ctrl+C and SIGTERM.
    pub install_signal_handler: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            start_timeout_ms: None,
            stop_timeout_ms: None,
            install_signal_handler: true,
        }
    }
}

impl RuntimeConfig {
    /// Read `IGNITION_CONFLICT_POLICY`, `IGNITION_START_TIMEOUT_MS`,
    /// `IGNITION_STOP_TIMEOUT_MS` and `IGNITION_INSTALL_SIGNAL_HANDLER`.
    pub fn from_env() -> Result<Self, IgnitionError> {
        Self::from_config_service(&ConfigService::from_env())
    }

    pub fn from_config_service(config: &ConfigService) -> Result<Self, IgnitionError> {
        let key = |name: &str| format!("{ENV_PREFIX}{name}");
        let defaults = Self::default();

        let resolved = Self {
            conflict_policy: config
                .parse(&key("CONFLICT_POLICY"))?
                .unwrap_or(defaults.conflict_policy),
            start_timeout_ms: config.parse(&key("START_TIMEOUT_MS"))?,
            stop_timeout_ms: config.parse(&key("STOP_TIMEOUT_MS"))?,
            install_signal_handler: config
                .parse_flag(&key("INSTALL_SIGNAL_HANDLER"))?
                .unwrap_or(defaults.install_signal_handler),
        };
        tracing::debug!(?resolved, "Runtime configuration loaded");
        Ok(resolved)
    }

    pub fn from_json(json: &str) -> Result<Self, IgnitionError> {
        serde_json::from_str(json).map_err(|e| IgnitionError::InvalidConfig(e.to_string()))
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }

    /// Whether managed components need a [`TimeBounded`](crate::lifecycle::TimeBounded) wrapper.
    pub fn is_time_bounded(&self) -> bool {
        self.start_timeout_ms.is_some() || self.stop_timeout_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_gives_defaults() {
        let config = RuntimeConfig::from_config_service(&ConfigService::new()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.install_signal_handler);
        assert!(!config.is_time_bounded());
    }

    #[test]
    fn test_reads_prefixed_vars() {
        let service = ConfigService::from_vars([
            ("IGNITION_CONFLICT_POLICY", "Reject"),
            ("IGNITION_START_TIMEOUT_MS", "1500"),
            ("IGNITION_INSTALL_SIGNAL_HANDLER", "off"),
            ("CONFLICT_POLICY", "ignored"),
        ]);
        let config = RuntimeConfig::from_config_service(&service).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.start_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.stop_timeout(), None);
        assert!(!config.install_signal_handler);
    }

    #[test]
    fn test_invalid_value_names_key() {
        let service = ConfigService::from_vars([("IGNITION_STOP_TIMEOUT_MS", "soon")]);
        let err = RuntimeConfig::from_config_service(&service).unwrap_err();
        assert!(err.to_string().contains("IGNITION_STOP_TIMEOUT_MS=soon"));
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_from_json() {
        let config =
            RuntimeConfig::from_json(r#"{ "conflict_policy": "reject", "stop_timeout_ms": 250 }"#)
                .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.stop_timeout_ms, Some(250));
        assert!(config.install_signal_handler);

        assert!(RuntimeConfig::from_json(r#"{ "conflict_policy": "first_wins" }"#).is_err());
        assert!(RuntimeConfig::from_json(r#"{ "retries": 3 }"#).is_err());
    }

    #[test]
    fn test_config_service_set_get() {
        let service = ConfigService::new();
        assert!(service.is_empty());
        service.set("APP_NAME", "billing");
        assert_eq!(service.get("APP_NAME").as_deref(), Some("billing"));
        assert_eq!(service.len(), 1);
    }
}

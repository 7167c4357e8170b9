//! Provider and polling configuration.
//!
//! Providers receive their configuration as JSON from the host. Poll settings
//! are expressed in seconds (`sleep`, `timeout`), with global defaults and
//! optional per-resource-type overrides:
//!
//! ```
//! use hemmer_reconciler::config::ProviderConfig;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let config = ProviderConfig::from_value(json!({
//!     "api_key": "secret",
//!     "fast_destroy": true,
//!     "resources": { "plugin": { "sleep": 5, "timeout": 600 } }
//! }))
//! .unwrap();
//!
//! let poll = config.poll_config_for("plugin").unwrap();
//! assert_eq!(poll.interval(), Duration::from_secs(5));
//! assert!(config.orchestrator_config().fast_destroy);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Default poll interval in seconds.
pub const DEFAULT_SLEEP_SECS: u64 = 10;

/// Default wait budget in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Default control plane base URL.
pub const DEFAULT_BASE_URL: &str = "https://customer.cloudamqp.com/api";

/// Interval and budget for a single wait.
///
/// Invariant: `interval > 0` and `timeout >= interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    interval: Duration,
    timeout: Duration,
}

impl PollConfig {
    /// Create a poll configuration, rejecting a zero interval or a timeout shorter than it.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, ProviderError> {
        if interval.is_zero() {
            return Err(ProviderError::Configuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if timeout < interval {
            return Err(ProviderError::Configuration(format!(
                "poll timeout ({:?}) must not be shorter than the interval ({:?})",
                timeout, interval
            )));
        }
        Ok(Self { interval, timeout })
    }

    /// Create a poll configuration from whole seconds.
    pub fn from_secs(sleep: u64, timeout: u64) -> Result<Self, ProviderError> {
        Self::new(Duration::from_secs(sleep), Duration::from_secs(timeout))
    }

    /// Time between probes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total wait budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SLEEP_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Per-type poll overrides, as they appear in provider configuration.
///
/// Either field may be omitted, in which case the global value applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    /// Poll interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<u64>,
    /// Wait budget in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl PollSettings {
    /// Override both settings.
    pub fn new(sleep: u64, timeout: u64) -> Self {
        Self {
            sleep: Some(sleep),
            timeout: Some(timeout),
        }
    }

    /// Fill unset fields from the global `sleep` and `timeout`, then validate.
    pub fn resolve(self, sleep: u64, timeout: u64) -> Result<PollConfig, ProviderError> {
        PollConfig::from_secs(self.sleep.unwrap_or(sleep), self.timeout.unwrap_or(timeout))
    }
}

/// Settings that change how an orchestrator behaves, independent of resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrchestratorConfig {
    /// Skip the remote delete for parent-scoped objects and rely on the
    /// parent's teardown to remove them. Gives no confirmation of removal.
    pub fast_destroy: bool,
}

impl OrchestratorConfig {
    /// Enable or disable fast destroy.
    pub fn with_fast_destroy(mut self, enabled: bool) -> Self {
        self.fast_destroy = enabled;
        self
    }
}

/// Provider configuration, deserialized from the host's JSON.
///
/// The `Debug` output redacts `api_key`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the control plane API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key used to authenticate against the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// See [`OrchestratorConfig::fast_destroy`].
    #[serde(default)]
    pub fast_destroy: bool,
    /// Default poll interval in seconds.
    #[serde(default = "default_sleep")]
    pub sleep: u64,
    /// Default wait budget in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Per-resource-type poll overrides.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub resources: HashMap<String, PollSettings>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("fast_destroy", &self.fast_destroy)
            .field("sleep", &self.sleep)
            .field("timeout", &self.timeout)
            .field("resources", &self.resources)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sleep() -> u64 {
    DEFAULT_SLEEP_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            fast_destroy: false,
            sleep: DEFAULT_SLEEP_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
            resources: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Deserialize and validate configuration received from the host.
    ///
    /// A `null` value yields the defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every poll setting and the base URL.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.base_url.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "base_url must not be empty".to_string(),
            ));
        }
        PollConfig::from_secs(self.sleep, self.timeout)?;
        for (resource_type, settings) in &self.resources {
            settings.resolve(self.sleep, self.timeout).map_err(|e| {
                ProviderError::Configuration(format!("{}: {}", resource_type, e.message()))
            })?;
        }
        Ok(())
    }

    /// Effective poll configuration for a resource type.
    pub fn poll_config_for(&self, resource_type: &str) -> Result<PollConfig, ProviderError> {
        match self.resources.get(resource_type) {
            Some(settings) => settings.resolve(self.sleep, self.timeout),
            None => PollConfig::from_secs(self.sleep, self.timeout),
        }
    }

    /// Orchestrator behavior derived from this configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default().with_fast_destroy(self.fast_destroy)
    }
}

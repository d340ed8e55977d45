//! Registry configuration, loaded from YAML.
//!
//! ```yaml
//! registry:
//!   port: 3000
//!   log_level: info
//! heartbeat:
//!   interval: 3s
//!   probe_timeout: 2s
//!   probe_attempts: 3
//!   probe_backoff: 1s
//!   probe_concurrency: 64
//! notify:
//!   timeout: 2s
//!   concurrency: 16
//! ```
//!
//! Every field is optional; a missing section takes its defaults.

use crate::heartbeat::HeartbeatConfig;
use crate::notifier::NotifyConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use svcreg_monitoring::ProbePolicy;

pub const DEFAULT_PORT: u16 = 3000;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub registry: RegistryOptions,
    #[serde(default)]
    pub heartbeat: HeartbeatOptions,
    #[serde(default)]
    pub notify: NotifyOptions,
}

/// Listener and logging options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryOptions {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Liveness checking options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatOptions {
    #[serde(default = "default_interval", with = "duration_serde")]
    pub interval: Duration,
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_probe_backoff", with = "duration_serde")]
    pub probe_backoff: Duration,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

/// Update fan-out options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyOptions {
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default = "default_notify_concurrency")]
    pub concurrency: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            probe_timeout: default_probe_timeout(),
            probe_attempts: default_probe_attempts(),
            probe_backoff: default_probe_backoff(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

impl Default for NotifyOptions {
    fn default() -> Self {
        Self {
            timeout: default_notify_timeout(),
            concurrency: default_notify_concurrency(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: RegistryConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let registry = &self.registry;
        if registry.port == 0 {
            return Err(anyhow!("Port must be between 1 and 65535, got: {}", registry.port));
        }
        match registry.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow!(
                    "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
                    registry.log_level
                ))
            }
        }

        let heartbeat = &self.heartbeat;
        if heartbeat.interval.is_zero() {
            return Err(anyhow!("Heartbeat interval must be greater than 0"));
        }
        if heartbeat.probe_timeout.is_zero() {
            return Err(anyhow!("Probe timeout must be greater than 0"));
        }
        if heartbeat.probe_attempts == 0 {
            return Err(anyhow!("Probe attempts must be at least 1"));
        }
        if heartbeat.probe_concurrency == 0 {
            return Err(anyhow!("Probe concurrency must be at least 1"));
        }

        if self.notify.timeout.is_zero() {
            return Err(anyhow!("Notify timeout must be greater than 0"));
        }
        if self.notify.concurrency == 0 {
            return Err(anyhow!("Notify concurrency must be at least 1"));
        }

        Ok(())
    }

    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            attempts: self.heartbeat.probe_attempts,
            timeout: self.heartbeat.probe_timeout,
            backoff: self.heartbeat.probe_backoff,
        }
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: self.heartbeat.interval,
            probe_concurrency: self.heartbeat.probe_concurrency,
        }
    }

    pub fn notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            timeout: self.notify.timeout,
            concurrency: self.notify.concurrency,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_probe_concurrency() -> usize {
    64
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_notify_concurrency() -> usize {
    16
}

// "<n>s", "<n>ms" or "<n>m"
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);

        // "ms" first, it also ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            num.parse().map(Duration::from_millis).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('s') {
            num.parse().map(Duration::from_secs).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.parse().map_err(|_| invalid())?;
            let secs = mins.checked_mul(60).ok_or_else(invalid)?;
            Ok(Duration::from_secs(secs))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

//! scalegrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ServiceConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalegridConfig {
    #[serde(default)]
    pub autoscaler: AutoscalerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Time between control loop cycles, e.g. "60s".
    pub interval: String,
    /// Sleep after a cycle fails unexpectedly.
    pub error_backoff: String,
    /// Upper bound for each collaborator call.
    pub fetch_timeout: String,
    pub metrics_window_minutes: u32,
    pub history_capacity: usize,
    pub status_decisions: usize,
    pub max_concurrency: usize,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            error_backoff: "30s".to_string(),
            fetch_timeout: "5s".to_string(),
            metrics_window_minutes: 5,
            history_capacity: 100,
            status_decisions: 10,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Number of action records kept in the action log.
    pub action_log_retention: usize,
    /// How long ingested metric samples are kept, e.g. "1h".
    pub sample_retention: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/scalegrid"),
            action_log_retention: 1000,
            sample_retention: "1h".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorMode {
    #[default]
    DryRun,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub mode: ExecutorMode,
    /// host:port of the scaling webhook.
    pub webhook_address: Option<String>,
    pub webhook_path: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::DryRun,
            webhook_address: None,
            webhook_path: "/scale".to_string(),
        }
    }
}

impl ScalegridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ScalegridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.autoscaler;
        for value in [&a.error_backoff, &self.store.sample_retention] {
            parse_duration(value)?;
        }
        for (key, value) in [("interval", &a.interval), ("fetch_timeout", &a.fetch_timeout)] {
            if parse_duration(value)?.is_zero() {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }
        if a.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".into()));
        }
        if a.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.executor.mode == ExecutorMode::Webhook && self.executor.webhook_address.is_none() {
            return Err(ConfigError::Invalid(
                "executor mode 'webhook' requires webhook_address".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            service.validate().map_err(|source| ConfigError::Service {
                name: service.name.clone(),
                source,
            })?;
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "service '{}' is defined twice",
                    service.name
                )));
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        parse_duration(&self.autoscaler.interval).unwrap_or(Duration::from_secs(60))
    }

    pub fn error_backoff(&self) -> Duration {
        parse_duration(&self.autoscaler.error_backoff).unwrap_or(Duration::from_secs(30))
    }

    pub fn fetch_timeout(&self) -> Duration {
        parse_duration(&self.autoscaler.fetch_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn sample_retention(&self) -> Duration {
        parse_duration(&self.store.sample_retention).unwrap_or(Duration::from_secs(3600))
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h". A bare number
/// is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());

    let (digits, unit_secs, millis) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 0, true)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1, false)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60, false)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600, false)
    } else {
        (s, 1, false)
    };

    let n = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    if millis {
        Ok(Duration::from_millis(n))
    } else {
        n.checked_mul(unit_secs).map(Duration::from_secs).ok_or_else(invalid)
    }
}

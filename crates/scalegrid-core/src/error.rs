//! Error types shared across ScaleGrid crates.

use thiserror::Error;

/// A `ServiceConfig` that cannot be registered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("min_instances ({min}) exceeds max_instances ({max})")]
    InstanceBounds { min: u32, max: u32 },

    #[error("{field} must be within 0-100, got {value}")]
    TargetOutOfRange { field: &'static str, value: f64 },

    #[error("weight for {metric} must be finite and non-negative, got {weight}")]
    InvalidWeight { metric: &'static str, weight: f64 },

    #[error("thresholds for {metric} must be finite")]
    NonFiniteThreshold { metric: &'static str },

    #[error("threshold_down ({down}) for {metric} exceeds threshold_up ({up})")]
    InvertedThresholds {
        metric: &'static str,
        up: f64,
        down: f64,
    },
}

/// Failure of an external collaborator call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed collaborator response: {0}")]
    Malformed(String),

    #[error("unknown service: {0}")]
    UnknownService(String),
}

/// Errors raised while loading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("invalid service '{name}': {source}")]
    Service {
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("{0}")]
    Invalid(String),
}

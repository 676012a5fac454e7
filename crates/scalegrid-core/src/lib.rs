//! scalegrid-core — shared types for the ScaleGrid autoscaler.
//!
//! Holds the data model of one evaluation cycle (`ScalingMetric`,
//! `ServiceConfig`, `ScalingDecision`, `CooldownRecord`), the collaborator
//! contracts the control loop pulls from and pushes to, and the
//! `scalegrid.toml` configuration format.

pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::{ScalegridConfig, parse_duration};
pub use error::{ConfigError, SourceError, ValidationError};
pub use source::{ActionLog, BoxFuture, InstanceSource, MetricsSource, ScaleExecutor, SourceResult};
pub use types::*;

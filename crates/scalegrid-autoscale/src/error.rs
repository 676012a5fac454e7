//! Errors surfaced by the autoscaler.

use thiserror::Error;

use scalegrid_core::{SourceError, ValidationError};

#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("service not registered: {0}")]
    UnknownService(String),

    #[error("invalid service config: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to fetch instance count: {0}")]
    InstanceCount(#[source] SourceError),
}

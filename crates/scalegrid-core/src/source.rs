//! Collaborator contracts consumed by the autoscaler.
//!
//! Concrete bindings (monitoring backends, orchestration APIs, action log
//! storage) live outside the decision core and are injected as
//! `Arc<dyn Trait>`. Every method returns a boxed future so the traits stay
//! object-safe; the autoscaler bounds each call with its own timeout.

use std::future::Future;
use std::pin::Pin;

use crate::error::SourceError;
use crate::types::{ActionRecord, CustomMetrics, InfrastructureMetrics, ScalingDecision};

/// Boxed, sendable future returned by collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a collaborator call.
pub type SourceResult<T> = Result<T, SourceError>;

/// Supplies observed metrics for a service.
pub trait MetricsSource: Send + Sync {
    /// CPU, memory and request rate over the last `window_minutes`, with
    /// trend factors where enough history exists.
    fn fetch_infrastructure<'a>(
        &'a self,
        service: &'a str,
        window_minutes: u32,
    ) -> BoxFuture<'a, SourceResult<InfrastructureMetrics>>;

    /// Response time, error rate, queue depth and active connections.
    fn fetch_custom<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<CustomMetrics>>;
}

/// Reports how many instances a service is currently running.
pub trait InstanceSource: Send + Sync {
    /// Must return at least 1 when the count is unknown.
    fn current_instances<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<u32>>;
}

/// Carries out a scaling decision on the compute platform.
pub trait ScaleExecutor: Send + Sync {
    /// Returns `Ok(false)` when the platform rejected the request.
    fn execute<'a>(&'a self, decision: &'a ScalingDecision) -> BoxFuture<'a, SourceResult<bool>>;
}

/// Durable, bounded log of issued actions.
pub trait ActionLog: Send + Sync {
    fn append(&self, record: ActionRecord) -> BoxFuture<'_, SourceResult<()>>;
}

//! Store-backed metrics and instance sources.
//!
//! Samples pushed through the API land in the state store; `StoreMetrics`
//! turns them into the readings the autoscaler asks for. Infrastructure
//! readings are averages over the requested window with least-squares
//! trend factors; custom readings are the newest value of each field.

use std::time::Duration;

use tracing::debug;

use scalegrid_autoscale::{Clock, system_clock};
use scalegrid_core::{
    BoxFuture, CustomMetrics, InfrastructureMetrics, InstanceSource, MetricsSource, SourceError,
    SourceResult,
};
use scalegrid_state::{InstanceCount, MetricSample, StateError, StateResult, StateStore};

use crate::trend::trend_factor;

/// How far back custom readings are looked up.
pub const CUSTOM_LOOKBACK_SECS: u64 = 300;

/// Instance count reported for a service nobody has reported on yet.
pub const DEFAULT_INSTANCE_COUNT: u32 = 1;

/// `MetricsSource` + `InstanceSource` over the state store.
#[derive(Clone)]
pub struct StoreMetrics {
    store: StateStore,
    clock: Clock,
}

impl StoreMetrics {
    pub fn new(store: StateStore) -> Self {
        Self::with_clock(store, system_clock())
    }

    pub fn with_clock(store: StateStore, clock: Clock) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Persist a sample. A zero timestamp is replaced with the current time.
    pub fn record_sample(&self, mut sample: MetricSample) -> StateResult<MetricSample> {
        if sample.timestamp == 0 {
            sample.timestamp = self.now();
        }
        self.store.put_sample(&sample)?;
        debug!(service = %sample.service_name, timestamp = sample.timestamp, "metric sample recorded");
        Ok(sample)
    }

    pub fn set_instance_count(&self, service: &str, count: u32) -> StateResult<InstanceCount> {
        let record = InstanceCount {
            service_name: service.to_string(),
            count,
            updated_at: self.now(),
        };
        self.store.put_instance_count(&record)?;
        Ok(record)
    }

    /// Last reported count, or 1 when unknown. A reported 0 is also raised to 1.
    pub fn instance_count(&self, service: &str) -> StateResult<u32> {
        Ok(self
            .store
            .get_instance_count(service)?
            .map(|c| c.count.max(1))
            .unwrap_or(DEFAULT_INSTANCE_COUNT))
    }

    /// Window averages and trends for the `window_minutes` ending at `now`.
    pub fn infrastructure_at(
        &self,
        service: &str,
        window_minutes: u32,
        now: u64,
    ) -> StateResult<InfrastructureMetrics> {
        let from = now.saturating_sub(u64::from(window_minutes) * 60);
        let samples = self.store.list_samples(service, from, now)?;

        let cpu = series(&samples, |s| s.cpu_utilization);
        let memory = series(&samples, |s| s.memory_utilization);
        let requests = series(&samples, |s| s.request_rate);

        Ok(InfrastructureMetrics {
            cpu_utilization: mean(&cpu),
            memory_utilization: mean(&memory),
            request_rate: mean(&requests),
            cpu_trend: (!cpu.is_empty()).then(|| trend_factor(&cpu)),
            memory_trend: (!memory.is_empty()).then(|| trend_factor(&memory)),
        })
    }

    /// Newest value of each custom field within the lookback ending at `now`.
    pub fn custom_at(&self, service: &str, now: u64) -> StateResult<CustomMetrics> {
        let from = now.saturating_sub(CUSTOM_LOOKBACK_SECS);
        let samples = self.store.list_samples(service, from, now)?;

        let latest = |field: fn(&MetricSample) -> Option<f64>| {
            samples.iter().rev().find_map(|s| field(s).filter(|v| v.is_finite()))
        };

        Ok(CustomMetrics {
            avg_response_time_ms: latest(|s| s.avg_response_time_ms),
            error_rate_percent: latest(|s| s.error_rate_percent),
            queue_depth: latest(|s| s.queue_depth),
            active_connections: latest(|s| s.active_connections),
        })
    }

    /// Drop samples older than `retention`. Returns the number removed.
    pub fn prune(&self, retention: Duration) -> StateResult<u32> {
        let cutoff = self.now().saturating_sub(retention.as_secs());
        self.store.prune_samples(cutoff)
    }
}

impl MetricsSource for StoreMetrics {
    fn fetch_infrastructure<'a>(
        &'a self,
        service: &'a str,
        window_minutes: u32,
    ) -> BoxFuture<'a, SourceResult<InfrastructureMetrics>> {
        Box::pin(async move {
            self.infrastructure_at(service, window_minutes, self.now())
                .map_err(unavailable)
        })
    }

    fn fetch_custom<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<CustomMetrics>> {
        Box::pin(async move { self.custom_at(service, self.now()).map_err(unavailable) })
    }
}

impl InstanceSource for StoreMetrics {
    fn current_instances<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<u32>> {
        Box::pin(async move { self.instance_count(service).map_err(unavailable) })
    }
}

fn unavailable(e: StateError) -> SourceError {
    SourceError::Unavailable(e.to_string())
}

fn series(samples: &[MetricSample], field: impl Fn(&MetricSample) -> Option<f64>) -> Vec<(u64, f64)> {
    samples
        .iter()
        .filter_map(|s| field(s).filter(|v| v.is_finite()).map(|v| (s.timestamp, v)))
        .collect()
}

fn mean(points: &[(u64, f64)]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|(_, v)| v).sum::<f64>() / points.len() as f64)
}

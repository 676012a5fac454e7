//! Builds the evaluation metric set from collaborator readings.

use scalegrid_core::{CustomMetrics, InfrastructureMetrics, MetricBand, ScalingMetric, ServiceConfig};

/// Fraction of a utilization target below which a service is considered
/// over-provisioned.
pub const SCALE_DOWN_TARGET_FRACTION: f64 = 0.5;

/// Turn raw readings into `ScalingMetric`s. Readings that are missing (or
/// not finite) are left out.
pub fn build_metrics(
    config: &ServiceConfig,
    infra: &InfrastructureMetrics,
    custom: &CustomMetrics,
) -> Vec<ScalingMetric> {
    let t = &config.thresholds;
    let mut metrics = Vec::new();

    if let Some(value) = reading(infra.cpu_utilization) {
        let target = config.target_cpu_utilization;
        metrics.push(
            ScalingMetric::new("cpu_utilization", value, target, target * SCALE_DOWN_TARGET_FRACTION)
                .with_weight(t.cpu_weight)
                .with_trend(reading(infra.cpu_trend).unwrap_or(0.0)),
        );
    }
    if let Some(value) = reading(infra.memory_utilization) {
        let target = config.target_memory_utilization;
        metrics.push(
            ScalingMetric::new(
                "memory_utilization",
                value,
                target,
                target * SCALE_DOWN_TARGET_FRACTION,
            )
            .with_weight(t.memory_weight)
            .with_trend(reading(infra.memory_trend).unwrap_or(0.0)),
        );
    }

    let banded = [
        ("request_rate", infra.request_rate, &t.request_rate),
        ("avg_response_time_ms", custom.avg_response_time_ms, &t.avg_response_time_ms),
        ("error_rate_percent", custom.error_rate_percent, &t.error_rate_percent),
        ("queue_depth", custom.queue_depth, &t.queue_depth),
        ("active_connections", custom.active_connections, &t.active_connections),
    ];
    for (name, value, band) in banded {
        if let Some(value) = reading(value) {
            metrics.push(from_band(name, value, band));
        }
    }

    metrics
}

fn from_band(name: &str, value: f64, band: &MetricBand) -> ScalingMetric {
    ScalingMetric::new(name, value, band.up, band.down).with_weight(band.weight)
}

fn reading(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

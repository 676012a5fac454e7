//! Decision engine — turns a metric set into a scaling decision.
//!
//! Each metric outside its band contributes a ratio-based score capped at
//! its own weight; scores are normalized by total weight so services with
//! different metric sets are comparable. A rising trend amplifies
//! scale-up urgency and a falling trend amplifies scale-down urgency.

use scalegrid_core::{ScalingDecision, ScalingDirection, ScalingMetric, ServiceConfig};

/// A normalized score must exceed this to act.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

/// At most a 2x jump in one cycle.
pub const MAX_SCALE_UP_FACTOR: f64 = 2.0;

/// At most a 50% cut in one cycle.
pub const MIN_SCALE_DOWN_FACTOR: f64 = 0.5;

pub const NO_METRICS_REASON: &str = "No metrics available";
pub const NORMAL_RANGE_REASON: &str = "All metrics within normal range";

/// Aggregated scores for one metric set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    /// Normalized by `total_weight` when it is positive.
    pub scale_up: f64,
    pub scale_down: f64,
    pub total_weight: f64,
    /// One fragment per metric outside its band.
    pub triggers: Vec<String>,
}

/// Score a metric set without deciding anything.
pub fn score(metrics: &[ScalingMetric]) -> Scores {
    let mut scores = Scores::default();

    for metric in metrics {
        let weight = effective_weight(metric.weight);
        scores.total_weight += weight;
        if weight == 0.0 {
            continue;
        }

        let value = metric.current_value;
        if value > metric.threshold_up {
            let excess = ratio(value - metric.threshold_up, metric.threshold_up);
            let mut contribution = (excess * weight).min(weight);
            if metric.trend_factor > 0.0 {
                contribution *= 1.0 + metric.trend_factor;
            }
            scores.scale_up += contribution;
            scores.triggers.push(format!(
                "{}: {:.2} > {:.2}",
                metric.name, value, metric.threshold_up
            ));
        } else if value < metric.threshold_down {
            let under = ratio(metric.threshold_down - value, metric.threshold_down);
            let mut contribution = (under * weight).min(weight);
            if metric.trend_factor < 0.0 {
                contribution *= 1.0 - metric.trend_factor;
            }
            scores.scale_down += contribution;
            scores.triggers.push(format!(
                "{}: {:.2} < {:.2}",
                metric.name, value, metric.threshold_down
            ));
        }
    }

    if scores.total_weight > 0.0 {
        scores.scale_up /= scores.total_weight;
        scores.scale_down /= scores.total_weight;
    }
    scores
}

/// Decide how many instances `config.name` should run.
pub fn decide(
    config: &ServiceConfig,
    current_instances: u32,
    metrics: Vec<ScalingMetric>,
    now: u64,
) -> ScalingDecision {
    if metrics.is_empty() {
        return ScalingDecision::maintain(
            &config.name,
            current_instances,
            NO_METRICS_REASON,
            metrics,
            now,
        );
    }

    let scores = score(&metrics);
    let reasoning = if scores.triggers.is_empty() {
        NORMAL_RANGE_REASON.to_string()
    } else {
        scores.triggers.join(" | ")
    };

    let (direction, confidence, factor) =
        if scores.scale_up > CONFIDENCE_THRESHOLD && scores.scale_up > scores.scale_down {
            let factor = (1.0 + scores.scale_up).min(MAX_SCALE_UP_FACTOR);
            (ScalingDirection::Up, scores.scale_up, factor)
        } else if scores.scale_down > CONFIDENCE_THRESHOLD && scores.scale_down > scores.scale_up {
            let factor = (1.0 - scores.scale_down * 0.5).max(MIN_SCALE_DOWN_FACTOR);
            (ScalingDirection::Down, scores.scale_down, factor)
        } else {
            return ScalingDecision::maintain(
                &config.name,
                current_instances,
                &reasoning,
                metrics,
                now,
            );
        };

    ScalingDecision {
        service_name: config.name.clone(),
        direction,
        target_instances: scaled_target(config, current_instances, factor),
        current_instances,
        // Trend amplification can push a score past 1.
        confidence: confidence.clamp(0.0, 1.0),
        reasoning,
        metrics_used: metrics,
        timestamp: now,
    }
}

/// `round(current * factor)` clamped to the service's bounds.
fn scaled_target(config: &ServiceConfig, current: u32, factor: f64) -> u32 {
    let raw = (current as f64 * factor).round().max(0.0) as u32;
    raw.max(config.min_instances).min(config.max_instances)
}

fn effective_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// `delta / base`; a non-positive base saturates at 1.
fn ratio(delta: f64, base: f64) -> f64 {
    if base > 0.0 { delta / base } else { 1.0 }
}

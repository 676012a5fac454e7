//! Domain types shared by every ScaleGrid crate.
//!
//! These describe one evaluation cycle: the metrics observed for a service,
//! the static policy that service is scaled under, and the decision the
//! engine produced. All types are JSON-serializable so they can be stored,
//! logged and returned over the API unchanged.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unique name of a managed service.
pub type ServiceName = String;

// ── Direction ─────────────────────────────────────────────────────

/// Which way a decision moves the instance count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalingDirection {
    Up,
    Down,
    Maintain,
}

impl ScalingDirection {
    /// Whether a decision in this direction requires an executor call.
    pub fn is_action(self) -> bool {
        self != ScalingDirection::Maintain
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalingDirection::Up => "UP",
            ScalingDirection::Down => "DOWN",
            ScalingDirection::Maintain => "MAINTAIN",
        }
    }
}

impl std::fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// One observed signal at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingMetric {
    /// Identifier, e.g. `cpu_utilization`.
    pub name: String,
    pub current_value: f64,
    pub threshold_up: f64,
    pub threshold_down: f64,
    /// Non-negative contribution to the aggregate score.
    pub weight: f64,
    /// Signed slope normalized by mean. Zero without enough history.
    #[serde(default)]
    pub trend_factor: f64,
}

impl ScalingMetric {
    pub fn new(name: &str, current_value: f64, threshold_up: f64, threshold_down: f64) -> Self {
        Self {
            name: name.to_string(),
            current_value,
            threshold_up,
            threshold_down,
            weight: 1.0,
            trend_factor: 0.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_trend(mut self, trend_factor: f64) -> Self {
        self.trend_factor = trend_factor;
        self
    }
}

/// Readings from the infrastructure monitoring backend.
///
/// `None` means the backend had no value; the metric is then left out of
/// the evaluation set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureMetrics {
    pub cpu_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
    pub request_rate: Option<f64>,
    pub cpu_trend: Option<f64>,
    pub memory_trend: Option<f64>,
}

/// Readings from the application/business metrics store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomMetrics {
    pub avg_response_time_ms: Option<f64>,
    pub error_rate_percent: Option<f64>,
    pub queue_depth: Option<f64>,
    pub active_connections: Option<f64>,
}

// ── Service policy ────────────────────────────────────────────────

/// Thresholds and weight for a metric that has no per-service target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBand {
    pub up: f64,
    pub down: f64,
    pub weight: f64,
}

impl MetricBand {
    pub const fn new(up: f64, down: f64, weight: f64) -> Self {
        Self { up, down, weight }
    }
}

/// How raw collaborator readings are turned into `ScalingMetric`s.
///
/// CPU and memory bands derive from the service's utilization targets
/// (scale up above the target, down below half of it); only their weights
/// live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub request_rate: MetricBand,
    pub avg_response_time_ms: MetricBand,
    pub error_rate_percent: MetricBand,
    pub queue_depth: MetricBand,
    pub active_connections: MetricBand,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 0.8,
            // Observed but not scored unless an operator gives it weight.
            request_rate: MetricBand::new(1000.0, 50.0, 0.0),
            avg_response_time_ms: MetricBand::new(1000.0, 200.0, 0.7),
            // A low error rate is never a reason to shed capacity.
            error_rate_percent: MetricBand::new(5.0, 0.0, 0.9),
            queue_depth: MetricBand::new(100.0, 10.0, 0.6),
            active_connections: MetricBand::new(1000.0, 100.0, 0.5),
        }
    }
}

impl MetricThresholds {
    fn bands(&self) -> [(&'static str, &MetricBand); 5] {
        [
            ("request_rate", &self.request_rate),
            ("avg_response_time_ms", &self.avg_response_time_ms),
            ("error_rate_percent", &self.error_rate_percent),
            ("queue_depth", &self.queue_depth),
            ("active_connections", &self.active_connections),
        ]
    }
}

/// Static scaling policy for one managed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceName,
    pub min_instances: u32,
    pub max_instances: u32,
    /// Percent, 0–100.
    pub target_cpu_utilization: f64,
    /// Percent, 0–100.
    pub target_memory_utilization: f64,
    pub scale_up_cooldown_secs: u64,
    pub scale_down_cooldown_secs: u64,
    #[serde(default)]
    pub thresholds: MetricThresholds,
}

impl ServiceConfig {
    /// A config with fleet defaults: 1–10
    /// instances, 70% CPU / 80% memory targets, 5 minute up cooldown and
    /// 10 minute down cooldown.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            min_instances: 1,
            max_instances: 10,
            target_cpu_utilization: 70.0,
            target_memory_utilization: 80.0,
            scale_up_cooldown_secs: 300,
            scale_down_cooldown_secs: 600,
            thresholds: MetricThresholds::default(),
        }
    }

    /// Check the config before it enters a registry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.min_instances > self.max_instances {
            return Err(ValidationError::InstanceBounds {
                min: self.min_instances,
                max: self.max_instances,
            });
        }
        for (field, value) in [
            ("target_cpu_utilization", self.target_cpu_utilization),
            ("target_memory_utilization", self.target_memory_utilization),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::TargetOutOfRange {
                    field,
                    value,
                });
            }
        }

        let t = &self.thresholds;
        for (metric, weight) in [
            ("cpu_utilization", t.cpu_weight),
            ("memory_utilization", t.memory_weight),
        ] {
            check_weight(metric, weight)?;
        }
        for (metric, band) in t.bands() {
            check_weight(metric, band.weight)?;
            if !band.up.is_finite() || !band.down.is_finite() {
                return Err(ValidationError::NonFiniteThreshold { metric });
            }
            if band.down > band.up {
                return Err(ValidationError::InvertedThresholds {
                    metric,
                    up: band.up,
                    down: band.down,
                });
            }
        }
        Ok(())
    }
}

fn check_weight(metric: &'static str, weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(ValidationError::InvalidWeight { metric, weight });
    }
    Ok(())
}

// ── Decisions ─────────────────────────────────────────────────────

/// Output of one evaluation cycle for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service_name: ServiceName,
    pub direction: ScalingDirection,
    pub target_instances: u32,
    pub current_instances: u32,
    /// 0.0–1.0; 0 when no metrics were available.
    pub confidence: f64,
    /// Human-readable trace of which metrics triggered.
    pub reasoning: String,
    pub metrics_used: Vec<ScalingMetric>,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

impl ScalingDecision {
    /// A hold decision at the current instance count.
    pub fn maintain(
        service_name: &str,
        current_instances: u32,
        reasoning: &str,
        metrics_used: Vec<ScalingMetric>,
        timestamp: u64,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            direction: ScalingDirection::Maintain,
            target_instances: current_instances,
            current_instances,
            confidence: 0.0,
            reasoning: reasoning.to_string(),
            metrics_used,
            timestamp,
        }
    }

    pub fn is_action(&self) -> bool {
        self.direction.is_action()
    }
}

/// Per-service hysteresis state, written whenever an action is issued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    /// Unix timestamp (seconds) of the last issued action.
    pub last_action_timestamp: u64,
    pub last_action_direction: ScalingDirection,
}

/// An issued action, as persisted by the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub service_name: ServiceName,
    pub direction: ScalingDirection,
    pub from_instances: u32,
    pub to_instances: u32,
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: u64,
    /// Whether the executor reported success.
    pub success: bool,
}

impl ActionRecord {
    pub fn from_decision(decision: &ScalingDecision, success: bool) -> Self {
        Self {
            service_name: decision.service_name.clone(),
            direction: decision.direction,
            from_instances: decision.current_instances,
            to_instances: decision.target_instances,
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
            timestamp: decision.timestamp,
            success,
        }
    }
}

//! Persisted record types that only the state store knows about.

use serde::{Deserialize, Serialize};

/// One pushed observation of a service's metrics.
///
/// Any field may be absent; absent fields are skipped when averaging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub service_name: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    #[serde(default)]
    pub cpu_utilization: Option<f64>,
    #[serde(default)]
    pub memory_utilization: Option<f64>,
    #[serde(default)]
    pub request_rate: Option<f64>,
    #[serde(default)]
    pub avg_response_time_ms: Option<f64>,
    #[serde(default)]
    pub error_rate_percent: Option<f64>,
    #[serde(default)]
    pub queue_depth: Option<f64>,
    #[serde(default)]
    pub active_connections: Option<f64>,
}

impl MetricSample {
    pub fn table_key(&self) -> String {
        sample_key(&self.service_name, self.timestamp)
    }
}

pub(crate) fn sample_key(service: &str, timestamp: u64) -> String {
    format!("{service}:{timestamp:020}")
}

/// Last instance count reported for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCount {
    pub service_name: String,
    pub count: u32,
    pub updated_at: u64,
}

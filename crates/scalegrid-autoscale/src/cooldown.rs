//! Cooldown controller — hysteresis against flapping.
//!
//! A service that recently acted is held at its current instance count
//! until the cooldown window of its *previous* action has elapsed. One
//! timer per service: a service that just scaled up and now wants to
//! scale down waits out the scale-up window.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use scalegrid_core::{CooldownRecord, ScalingDecision, ScalingDirection, ServiceConfig};

/// Factor applied to the confidence of a decision held by cooldown.
pub const COOLDOWN_CONFIDENCE_FACTOR: f64 = 0.1;

/// Per-service cooldown records.
#[derive(Debug, Clone, Default)]
pub struct CooldownState {
    records: HashMap<String, CooldownRecord>,
}

/// Cooldown as seen by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub in_cooldown: bool,
    pub remaining_seconds: u64,
    pub last_direction: ScalingDirection,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service: &str) -> Option<&CooldownRecord> {
        self.records.get(service)
    }

    /// Record an issued action.
    pub fn record(&mut self, service: &str, direction: ScalingDirection, timestamp: u64) {
        self.records.insert(
            service.to_string(),
            CooldownRecord {
                last_action_timestamp: timestamp,
                last_action_direction: direction,
            },
        );
    }

    pub fn remove(&mut self, service: &str) -> Option<CooldownRecord> {
        self.records.remove(service)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seconds left before `service` may act again; 0 when free.
    pub fn remaining(&self, service: &str, config: &ServiceConfig, now: u64) -> u64 {
        match self.records.get(service) {
            Some(record) => {
                let window = cooldown_window(config, record.last_action_direction);
                let elapsed = now.saturating_sub(record.last_action_timestamp);
                window.saturating_sub(elapsed)
            }
            None => 0,
        }
    }

    pub fn status(&self, service: &str, config: &ServiceConfig, now: u64) -> Option<CooldownStatus> {
        let record = self.records.get(service)?;
        let remaining = self.remaining(service, config, now);
        Some(CooldownStatus {
            in_cooldown: remaining > 0,
            remaining_seconds: remaining,
            last_direction: record.last_action_direction,
        })
    }
}

/// Window that follows an action in `last_direction`.
pub fn cooldown_window(config: &ServiceConfig, last_direction: ScalingDirection) -> u64 {
    match last_direction {
        ScalingDirection::Up => config.scale_up_cooldown_secs,
        _ => config.scale_down_cooldown_secs,
    }
}

/// Hold `decision` if its service is cooling down, then record it if it
/// still acts.
///
/// A held decision becomes `Maintain` at the current count, keeps a tenth
/// of its confidence and gains a `COOLDOWN` note in its reasoning.
pub fn apply_cooldown(
    mut decision: ScalingDecision,
    config: &ServiceConfig,
    state: &mut CooldownState,
    now: u64,
) -> ScalingDecision {
    let remaining = state.remaining(&decision.service_name, config, now);
    if remaining > 0 {
        debug!(
            service = %decision.service_name,
            held = %decision.direction,
            remaining,
            "decision held by cooldown"
        );
        decision.direction = ScalingDirection::Maintain;
        decision.target_instances = decision.current_instances;
        decision.confidence *= COOLDOWN_CONFIDENCE_FACTOR;
        decision
            .reasoning
            .push_str(&format!(" | COOLDOWN: {remaining}s remaining"));
    }

    if decision.is_action() {
        state.record(&decision.service_name, decision.direction, now);
    }
    decision
}

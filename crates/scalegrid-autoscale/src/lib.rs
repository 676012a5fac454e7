//! scalegrid-autoscale — adaptive autoscaling for ScaleGrid services.
//!
//! Combines several weighted metrics into a single scale-up or
//! scale-down score, turns the winning score into a bounded target
//! instance count, and damps oscillation with per-service cooldowns.
//!
//! # Architecture
//!
//! ```text
//! Autoscaler (periodic loop, per-service lock)
//!   ├── MetricsSource / InstanceSource   (collaborators)
//!   ├── signals::build_metrics() → Vec<ScalingMetric>
//!   ├── engine::decide()         → ScalingDecision
//!   ├── cooldown::apply_cooldown()
//!   ├── DecisionHistory (bounded, newest 100)
//!   └── ScaleExecutor + ActionLog      (actionable decisions only)
//! ```
//!
//! # Scaling rules
//!
//! - Scale up when the up score dominates and confidence exceeds 0.3;
//!   the target grows by at most 2x, capped at `max_instances`.
//! - Scale down when the down score dominates and confidence exceeds 0.3;
//!   the target shrinks to no less than half, floored at `min_instances`.
//! - After an action, the service holds until the cooldown window of that
//!   action has elapsed.

pub mod controller;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod history;
pub mod signals;

pub use controller::{
    Autoscaler, AutoscalerHandle, AutoscalerSettings, AutoscalerStatus, Clock, Collaborators,
    system_clock,
};
pub use cooldown::{CooldownState, CooldownStatus, apply_cooldown};
pub use engine::{CONFIDENCE_THRESHOLD, decide};
pub use error::AutoscaleError;
pub use history::DecisionHistory;
pub use signals::build_metrics;

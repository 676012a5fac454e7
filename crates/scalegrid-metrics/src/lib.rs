//! scalegrid-metrics — store-backed collaborators and observability.
//!
//! Binds the autoscaler's collaborator contracts to the state store and
//! renders its state for Prometheus.
//!
//! # Architecture
//!
//! ```text
//! StoreMetrics
//!   ├── record_sample()        ← pushed through the API
//!   ├── fetch_infrastructure() → window averages + trend factors
//!   ├── fetch_custom()         → newest value per field
//!   └── current_instances()    → last reported count (1 if unknown)
//!
//! StoreActionLog
//!   └── append()               → bounded `actions` table
//!
//! Prometheus exposition
//!   └── render_prometheus()    → text/plain for /metrics endpoint
//! ```

pub mod action_log;
pub mod collector;
pub mod prometheus;
pub mod trend;

pub use action_log::StoreActionLog;
pub use collector::StoreMetrics;
pub use prometheus::render_prometheus;
pub use trend::trend_factor;

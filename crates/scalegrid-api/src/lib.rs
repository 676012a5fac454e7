//! scalegrid-api — REST API for ScaleGrid.
//!
//! Provides axum route handlers for registering services, pushing metric
//! samples and instance counts, triggering evaluations and reading the
//! autoscaler's state.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/status` | Autoscaler status snapshot |
//! | GET | `/api/v1/services` | List registered services |
//! | POST | `/api/v1/services` | Register (or replace) a service |
//! | GET | `/api/v1/services/{name}` | Get a service config |
//! | DELETE | `/api/v1/services/{name}` | Deregister a service |
//! | POST | `/api/v1/services/{name}/evaluate` | Evaluate a service now |
//! | POST | `/api/v1/services/{name}/samples` | Push a metric sample |
//! | PUT | `/api/v1/services/{name}/instances` | Report the instance count |
//! | GET | `/api/v1/decisions` | Recent decisions |
//! | GET | `/api/v1/actions` | Persisted action log |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post, put};
use scalegrid_autoscale::Autoscaler;
use scalegrid_metrics::StoreMetrics;
use scalegrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub autoscaler: Autoscaler,
    pub metrics: StoreMetrics,
    pub store: StateStore,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/services", get(handlers::list_services).post(handlers::register_service))
        .route("/services/{name}", get(handlers::get_service).delete(handlers::delete_service))
        .route("/services/{name}/evaluate", post(handlers::evaluate_service))
        .route("/services/{name}/samples", post(handlers::ingest_sample))
        .route("/services/{name}/instances", put(handlers::report_instances))
        .route("/decisions", get(handlers::list_decisions))
        .route("/actions", get(handlers::list_actions))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}

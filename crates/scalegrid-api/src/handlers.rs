//! REST API handlers.
//!
//! Service registration goes through the autoscaler (which validates) and
//! is then persisted so it survives a restart. Samples and instance counts
//! are written to the store, where the autoscaler's collaborators read
//! them back.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};

use scalegrid_autoscale::AutoscaleError;
use scalegrid_core::ServiceConfig;
use scalegrid_state::MetricSample;

use crate::ApiState;

const DEFAULT_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn not_found() -> axum::response::Response {
    error_response("service not found", StatusCode::NOT_FOUND).into_response()
}

/// `?limit=` query for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    /// Restrict decisions to one service.
    pub service: Option<String>,
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.autoscaler.status().await)
}

// ── Services ───────────────────────────────────────────────────

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.autoscaler.services().await)
}

/// GET /api/v1/services/{name}
pub async fn get_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.autoscaler.get_service(&name).await {
        Some(config) => ApiResponse::ok(config).into_response(),
        None => not_found(),
    }
}

/// POST /api/v1/services
pub async fn register_service(
    State(state): State<ApiState>,
    Json(config): Json<ServiceConfig>,
) -> impl IntoResponse {
    if let Err(e) = state.autoscaler.register_service(config.clone()).await {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    if let Err(e) = state.store.put_service(&config) {
        warn!(service = %config.name, error = %e, "service registered but not persisted");
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    (StatusCode::CREATED, ApiResponse::ok(config)).into_response()
}

/// DELETE /api/v1/services/{name}
pub async fn delete_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let registered = state.autoscaler.remove_service(&name).await;
    match state.store.delete_service(&name) {
        Ok(persisted) if registered || persisted => ApiResponse::ok("deleted").into_response(),
        Ok(_) => not_found(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/services/{name}/evaluate
pub async fn evaluate_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.autoscaler.evaluate_once(&name).await {
        Ok(decision) => ApiResponse::ok(decision).into_response(),
        Err(AutoscaleError::UnknownService(_)) => not_found(),
        Err(e @ AutoscaleError::InstanceCount(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

// ── Ingestion ──────────────────────────────────────────────────

/// Sample request body. A missing timestamp means "now".
#[derive(Debug, Default, Deserialize)]
pub struct SampleRequest {
    pub timestamp: Option<u64>,
    pub cpu_utilization: Option<f64>,
    pub memory_utilization: Option<f64>,
    pub request_rate: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
    pub error_rate_percent: Option<f64>,
    pub queue_depth: Option<f64>,
    pub active_connections: Option<f64>,
}

/// POST /api/v1/services/{name}/samples
pub async fn ingest_sample(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<SampleRequest>,
) -> impl IntoResponse {
    if state.autoscaler.get_service(&name).await.is_none() {
        return not_found();
    }
    let sample = MetricSample {
        service_name: name,
        timestamp: req.timestamp.unwrap_or(0),
        cpu_utilization: req.cpu_utilization,
        memory_utilization: req.memory_utilization,
        request_rate: req.request_rate,
        avg_response_time_ms: req.avg_response_time_ms,
        error_rate_percent: req.error_rate_percent,
        queue_depth: req.queue_depth,
        active_connections: req.active_connections,
    };
    match state.metrics.record_sample(sample) {
        Ok(stored) => (StatusCode::CREATED, ApiResponse::ok(stored)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Instance count request body.
#[derive(Debug, Deserialize)]
pub struct InstancesRequest {
    pub count: u32,
}

/// PUT /api/v1/services/{name}/instances
pub async fn report_instances(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<InstancesRequest>,
) -> impl IntoResponse {
    if state.autoscaler.get_service(&name).await.is_none() {
        return not_found();
    }
    match state.metrics.set_instance_count(&name, req.count) {
        Ok(record) => {
            info!(service = %name, count = req.count, "instance count reported");
            ApiResponse::ok(record).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── History ────────────────────────────────────────────────────

/// GET /api/v1/decisions?limit=&service=
pub async fn list_decisions(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let decisions = match &query.service {
        Some(service) => state.autoscaler.decisions_for(service, limit).await,
        None => state.autoscaler.recent_decisions(limit).await,
    };
    ApiResponse::ok(decisions)
}

/// GET /api/v1/actions?limit=
pub async fn list_actions(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.store.list_actions(query.limit.unwrap_or(DEFAULT_LIMIT)) {
        Ok(actions) => ApiResponse::ok(actions).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.autoscaler.status().await;
    let latest = state.autoscaler.latest_decisions().await;

    let body = scalegrid_metrics::render_prometheus(&status, &latest);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scalegrid_autoscale::{Autoscaler, AutoscalerSettings, Collaborators};
    use scalegrid_core::{BoxFuture, ScaleExecutor, ScalingDecision, SourceResult};
    use scalegrid_metrics::{StoreActionLog, StoreMetrics};
    use scalegrid_state::StateStore;

    struct AcceptAll;

    impl ScaleExecutor for AcceptAll {
        fn execute<'a>(&'a self, _decision: &'a ScalingDecision) -> BoxFuture<'a, SourceResult<bool>> {
            Box::pin(async { Ok(true) })
        }
    }

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        let metrics = StoreMetrics::new(store.clone());
        let collaborators = Collaborators {
            metrics: Arc::new(metrics.clone()),
            instances: Arc::new(metrics.clone()),
            executor: Arc::new(AcceptAll),
            action_log: Arc::new(StoreActionLog::new(store.clone(), 100)),
        };
        ApiState {
            autoscaler: Autoscaler::new(collaborators, AutoscalerSettings::default()),
            metrics,
            store,
        }
    }

    #[tokio::test]
    async fn status_empty() {
        let resp = get_status(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_persists_and_lists() {
        let state = test_state();
        let resp = register_service(State(state.clone()), Json(ServiceConfig::new("api")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        assert!(state.store.get_service("api").unwrap().is_some());
        assert_eq!(state.autoscaler.services().await.len(), 1);

        let resp = get_service(State(state), Path("api".to_string())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_rejects_invalid_config() {
        let state = test_state();
        let mut config = ServiceConfig::new("api");
        config.min_instances = 9;
        config.max_instances = 3;

        let resp = register_service(State(state.clone()), Json(config)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.get_service("api").unwrap().is_none());
    }

    #[tokio::test]
    async fn get_nonexistent_service() {
        let resp = get_service(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_service_exists_then_not() {
        let state = test_state();
        register_service(State(state.clone()), Json(ServiceConfig::new("api"))).await;

        let resp = delete_service(State(state.clone()), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.store.get_service("api").unwrap().is_none());

        let resp = delete_service(State(state), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn evaluate_uses_ingested_samples() {
        let state = test_state();
        register_service(State(state.clone()), Json(ServiceConfig::new("api"))).await;
        report_instances(
            State(state.clone()),
            Path("api".to_string()),
            Json(InstancesRequest { count: 2 }),
        )
        .await;
        let resp = ingest_sample(
            State(state.clone()),
            Path("api".to_string()),
            Json(SampleRequest {
                cpu_utilization: Some(140.0),
                ..Default::default()
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = evaluate_service(State(state.clone()), Path("api".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let latest = state.autoscaler.latest_decisions().await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].target_instances, 4);
        assert_eq!(state.store.list_actions(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn evaluate_unknown_service() {
        let resp = evaluate_service(State(test_state()), Path("ghost".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ingest_requires_registered_service() {
        let resp = ingest_sample(
            State(test_state()),
            Path("ghost".to_string()),
            Json(SampleRequest::default()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = report_instances(
            State(test_state()),
            Path("ghost".to_string()),
            Json(InstancesRequest { count: 3 }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_endpoints_empty() {
        let state = test_state();
        let resp = list_decisions(State(state.clone()), Query(ListQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = list_actions(State(state), Query(ListQuery { limit: Some(5), service: None }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let resp = prometheus_metrics(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}

//! Control loop tests.
//!
//! Drive the `Autoscaler` end to end against in-process collaborators: a
//! fixed metrics source, a fixed instance count, a recording executor and
//! an in-memory action log. Time comes from a manual clock so cooldown
//! windows are deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use scalegrid_autoscale::*;
use scalegrid_core::*;

// ── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct FixedMetrics {
    infra: Mutex<HashMap<String, InfrastructureMetrics>>,
    custom: Mutex<HashMap<String, CustomMetrics>>,
}

impl FixedMetrics {
    fn set_cpu(&self, service: &str, cpu: f64) {
        self.infra.lock().unwrap().insert(
            service.to_string(),
            InfrastructureMetrics {
                cpu_utilization: Some(cpu),
                ..Default::default()
            },
        );
    }
}

impl MetricsSource for FixedMetrics {
    fn fetch_infrastructure<'a>(
        &'a self,
        service: &'a str,
        _window_minutes: u32,
    ) -> BoxFuture<'a, SourceResult<InfrastructureMetrics>> {
        Box::pin(async move {
            if service == "explodes" {
                panic!("metrics backend crashed");
            }
            Ok(self.infra.lock().unwrap().get(service).cloned().unwrap_or_default())
        })
    }

    fn fetch_custom<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<CustomMetrics>> {
        Box::pin(async move { Ok(self.custom.lock().unwrap().get(service).cloned().unwrap_or_default()) })
    }
}

struct FailingMetrics;

impl MetricsSource for FailingMetrics {
    fn fetch_infrastructure<'a>(
        &'a self,
        _service: &'a str,
        _window_minutes: u32,
    ) -> BoxFuture<'a, SourceResult<InfrastructureMetrics>> {
        Box::pin(async { Err(SourceError::Unavailable("monitoring down".to_string())) })
    }

    fn fetch_custom<'a>(&'a self, _service: &'a str) -> BoxFuture<'a, SourceResult<CustomMetrics>> {
        Box::pin(async { Err(SourceError::Unavailable("monitoring down".to_string())) })
    }
}

struct SlowMetrics;

impl MetricsSource for SlowMetrics {
    fn fetch_infrastructure<'a>(
        &'a self,
        _service: &'a str,
        _window_minutes: u32,
    ) -> BoxFuture<'a, SourceResult<InfrastructureMetrics>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(InfrastructureMetrics {
                cpu_utilization: Some(140.0),
                ..Default::default()
            })
        })
    }

    fn fetch_custom<'a>(&'a self, _service: &'a str) -> BoxFuture<'a, SourceResult<CustomMetrics>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CustomMetrics::default())
        })
    }
}

/// Reports a fixed count; services named `missing` fail.
struct FixedInstances(u32);

impl InstanceSource for FixedInstances {
    fn current_instances<'a>(&'a self, service: &'a str) -> BoxFuture<'a, SourceResult<u32>> {
        Box::pin(async move {
            if service == "missing" {
                Err(SourceError::UnknownService(service.to_string()))
            } else {
                Ok(self.0)
            }
        })
    }
}

/// Parks the first count request until released.
struct GatedInstances {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedInstances {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

impl InstanceSource for GatedInstances {
    fn current_instances<'a>(&'a self, _service: &'a str) -> BoxFuture<'a, SourceResult<u32>> {
        Box::pin(async move {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(2)
        })
    }
}

struct RecordingExecutor {
    accept: bool,
    executed: Mutex<Vec<ScalingDecision>>,
}

impl RecordingExecutor {
    fn new(accept: bool) -> Self {
        Self {
            accept,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

impl ScaleExecutor for RecordingExecutor {
    fn execute<'a>(&'a self, decision: &'a ScalingDecision) -> BoxFuture<'a, SourceResult<bool>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(decision.clone());
            Ok(self.accept)
        })
    }
}

#[derive(Default)]
struct MemoryActionLog {
    records: Mutex<Vec<ActionRecord>>,
}

impl ActionLog for MemoryActionLog {
    fn append(&self, record: ActionRecord) -> BoxFuture<'_, SourceResult<()>> {
        Box::pin(async move {
            self.records.lock().unwrap().push(record);
            Ok(())
        })
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    autoscaler: Autoscaler,
    metrics: Arc<FixedMetrics>,
    executor: Arc<RecordingExecutor>,
    log: Arc<MemoryActionLog>,
    time: Arc<AtomicU64>,
}

impl Harness {
    fn new(current_instances: u32) -> Self {
        Self::build(current_instances, true, AutoscalerSettings::default())
    }

    fn build(current_instances: u32, accept: bool, settings: AutoscalerSettings) -> Self {
        let metrics = Arc::new(FixedMetrics::default());
        let executor = Arc::new(RecordingExecutor::new(accept));
        let log = Arc::new(MemoryActionLog::default());
        let time = Arc::new(AtomicU64::new(1000));

        let collaborators = Collaborators {
            metrics: metrics.clone(),
            instances: Arc::new(FixedInstances(current_instances)),
            executor: executor.clone(),
            action_log: log.clone(),
        };
        let clock_time = time.clone();
        let clock: Clock = Arc::new(move || clock_time.load(Ordering::SeqCst));

        Self {
            autoscaler: Autoscaler::with_clock(collaborators, settings, clock),
            metrics,
            executor,
            log,
            time,
        }
    }

    fn advance(&self, secs: u64) {
        self.time.fetch_add(secs, Ordering::SeqCst);
    }
}

fn web_service() -> ServiceConfig {
    let mut config = ServiceConfig::new("web");
    config.min_instances = 1;
    config.max_instances = 20;
    config.target_cpu_utilization = 70.0;
    config
}

fn with_source(metrics: Arc<dyn MetricsSource>, settings: AutoscalerSettings) -> Autoscaler {
    Autoscaler::new(
        Collaborators {
            metrics,
            instances: Arc::new(FixedInstances(2)),
            executor: Arc::new(RecordingExecutor::new(true)),
            action_log: Arc::new(MemoryActionLog::default()),
        },
        settings,
    )
}

// ── Decisions ──────────────────────────────────────────────────────

#[tokio::test]
async fn cpu_just_over_target_stays_below_confidence_threshold() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 90.0);

    let decision = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Maintain);
    assert_eq!(decision.target_instances, 2);
    assert_eq!(decision.reasoning, "cpu_utilization: 90.00 > 70.00");
    assert_eq!(h.executor.count(), 0);
    assert!(h.log.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn saturated_cpu_doubles_then_cooldown_holds() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 140.0);

    let first = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(first.direction, ScalingDirection::Up);
    assert_eq!(first.target_instances, 4);
    assert!((first.confidence - 1.0).abs() < 1e-9);
    assert_eq!(first.timestamp, 1000);
    assert_eq!(h.executor.count(), 1);

    {
        let records = h.log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].from_instances, 2);
        assert_eq!(records[0].to_instances, 4);
        assert!(records[0].success);
    }

    h.advance(1);
    let second = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(second.direction, ScalingDirection::Maintain);
    assert_eq!(second.target_instances, 2);
    assert!((second.confidence - 0.1).abs() < 1e-9);
    assert!(second.reasoning.ends_with(" | COOLDOWN: 299s remaining"));
    assert_eq!(h.executor.count(), 1);

    h.advance(299);
    let third = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(third.direction, ScalingDirection::Up);
    assert_eq!(h.executor.count(), 2);
}

#[tokio::test]
async fn idle_service_scales_down_to_min() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 0.0);

    let decision = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Down);
    assert_eq!(decision.target_instances, 1);
    assert_eq!(decision.reasoning, "cpu_utilization: 0.00 < 35.00");
}

#[tokio::test]
async fn repeated_hold_is_idempotent() {
    let h = Harness::new(3);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 50.0);

    let a = h.autoscaler.evaluate_once("web").await.unwrap();
    let b = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.reasoning, "All metrics within normal range");
}

#[tokio::test]
async fn rejected_action_is_logged_as_failed_and_still_cools_down() {
    let h = Harness::build(2, false, AutoscalerSettings::default());
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 140.0);

    let decision = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Up);
    {
        let records = h.log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    h.advance(10);
    let held = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(held.direction, ScalingDirection::Maintain);
}

// ── Failure handling ───────────────────────────────────────────────

#[tokio::test]
async fn metrics_outage_yields_recorded_hold() {
    let autoscaler = with_source(Arc::new(FailingMetrics), AutoscalerSettings::default());
    autoscaler.register_service(web_service()).await.unwrap();

    let decision = autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Maintain);
    assert_eq!(decision.reasoning, "No metrics available");
    assert_eq!(decision.confidence, 0.0);
    assert_eq!(autoscaler.recent_decisions(10).await.len(), 1);
}

#[tokio::test]
async fn slow_metrics_source_times_out() {
    let settings = AutoscalerSettings {
        fetch_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let autoscaler = with_source(Arc::new(SlowMetrics), settings);
    autoscaler.register_service(web_service()).await.unwrap();

    let decision = tokio::time::timeout(Duration::from_secs(5), autoscaler.evaluate_once("web"))
        .await
        .expect("evaluation should not wait for the slow source")
        .unwrap();
    assert_eq!(decision.reasoning, "No metrics available");
}

#[tokio::test]
async fn unknown_instance_count_skips_service() {
    let h = Harness::new(2);
    h.autoscaler.register_service(ServiceConfig::new("missing")).await.unwrap();

    let err = h.autoscaler.evaluate_once("missing").await.unwrap_err();
    assert!(matches!(err, AutoscaleError::InstanceCount(_)));
    assert!(h.autoscaler.recent_decisions(10).await.is_empty());
}

#[tokio::test]
async fn cycle_continues_past_failing_services() {
    let h = Harness::new(2);
    for name in ["web", "missing", "explodes", "worker"] {
        h.autoscaler.register_service(ServiceConfig::new(name)).await.unwrap();
    }
    h.metrics.set_cpu("web", 140.0);
    h.metrics.set_cpu("worker", 50.0);

    let mut decisions = h.autoscaler.run_cycle().await;
    decisions.sort_by(|a, b| a.service_name.cmp(&b.service_name));

    let names: Vec<&str> = decisions.iter().map(|d| d.service_name.as_str()).collect();
    assert_eq!(names, vec!["web", "worker"]);
    assert_eq!(decisions[0].direction, ScalingDirection::Up);
    assert_eq!(decisions[1].direction, ScalingDirection::Maintain);
}

#[tokio::test]
async fn evaluating_unregistered_service_fails() {
    let h = Harness::new(2);
    let err = h.autoscaler.evaluate_once("ghost").await.unwrap_err();
    assert!(matches!(err, AutoscaleError::UnknownService(name) if name == "ghost"));
}

// ── Registry ───────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_config_is_rejected() {
    let h = Harness::new(2);
    let mut config = web_service();
    config.min_instances = 5;
    config.max_instances = 2;

    let err = h.autoscaler.register_service(config).await.unwrap_err();
    assert!(matches!(
        err,
        AutoscaleError::Invalid(ValidationError::InstanceBounds { min: 5, max: 2 })
    ));
    assert!(h.autoscaler.services().await.is_empty());
}

#[tokio::test]
async fn re_registering_replaces_config() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();

    let mut narrower = web_service();
    narrower.max_instances = 3;
    h.autoscaler.register_service(narrower).await.unwrap();

    let services = h.autoscaler.services().await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].max_instances, 3);

    h.metrics.set_cpu("web", 140.0);
    let decision = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.target_instances, 3);
}

#[tokio::test]
async fn removed_service_is_forgotten() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 140.0);
    h.autoscaler.evaluate_once("web").await.unwrap();

    assert!(h.autoscaler.remove_service("web").await);
    assert!(!h.autoscaler.remove_service("web").await);
    assert!(h.autoscaler.status().await.cooldown_status.is_empty());

    // Re-registering starts without a cooldown record.
    h.autoscaler.register_service(web_service()).await.unwrap();
    let decision = h.autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Up);
}

#[tokio::test]
async fn removal_waits_for_in_flight_evaluation() {
    let metrics = Arc::new(FixedMetrics::default());
    metrics.set_cpu("web", 140.0);
    let instances = Arc::new(GatedInstances::new());
    let executor = Arc::new(RecordingExecutor::new(true));
    let autoscaler = Autoscaler::new(
        Collaborators {
            metrics,
            instances: instances.clone(),
            executor: executor.clone(),
            action_log: Arc::new(MemoryActionLog::default()),
        },
        AutoscalerSettings::default(),
    );
    autoscaler.register_service(web_service()).await.unwrap();

    let evaluating = tokio::spawn({
        let autoscaler = autoscaler.clone();
        async move { autoscaler.evaluate_once("web").await }
    });
    instances.entered.notified().await;

    let removing = tokio::spawn({
        let autoscaler = autoscaler.clone();
        async move { autoscaler.remove_service("web").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!removing.is_finished());

    instances.release.notify_one();
    let decision = evaluating.await.unwrap().unwrap();
    assert_eq!(decision.direction, ScalingDirection::Up);
    assert!(removing.await.unwrap());
    assert_eq!(executor.count(), 1);

    // The removed service's cooldown does not carry over.
    autoscaler.register_service(web_service()).await.unwrap();
    let status = autoscaler.status().await;
    assert!(!status.cooldown_status.contains_key("web"));
    let decision = autoscaler.evaluate_once("web").await.unwrap();
    assert_eq!(decision.direction, ScalingDirection::Up);
    assert_eq!(executor.count(), 2);
}

#[tokio::test]
async fn orchestrators_do_not_share_state() {
    let a = Harness::new(2);
    let b = Harness::new(2);
    a.autoscaler.register_service(web_service()).await.unwrap();
    a.metrics.set_cpu("web", 140.0);
    a.autoscaler.evaluate_once("web").await.unwrap();

    assert!(b.autoscaler.services().await.is_empty());
    assert!(b.autoscaler.recent_decisions(10).await.is_empty());
    assert!(b.autoscaler.evaluate_once("web").await.is_err());

    // Clones share.
    let clone = a.autoscaler.clone();
    assert_eq!(clone.services().await.len(), 1);
}

// ── Status ─────────────────────────────────────────────────────────

#[tokio::test]
async fn history_is_bounded_and_status_shows_last_ten() {
    let h = Harness::new(3);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 50.0);

    for _ in 0..150 {
        h.advance(1);
        h.autoscaler.evaluate_once("web").await.unwrap();
    }

    let all = h.autoscaler.recent_decisions(1000).await;
    assert_eq!(all.len(), 100);
    assert_eq!(all[0].timestamp, 1051);
    assert_eq!(all[99].timestamp, 1150);

    let status = h.autoscaler.status().await;
    assert_eq!(status.last_decisions.len(), 10);
    assert_eq!(status.last_decisions[9].timestamp, 1150);
}

#[tokio::test]
async fn status_reports_services_and_cooldowns() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.autoscaler.register_service(ServiceConfig::new("api")).await.unwrap();
    h.metrics.set_cpu("web", 140.0);
    h.autoscaler.evaluate_once("web").await.unwrap();
    h.advance(100);

    let status = h.autoscaler.status().await;
    assert!(!status.running);
    assert_eq!(status.managed_services, vec!["api", "web"]);
    assert_eq!(status.last_decisions.len(), 1);

    let web = status.cooldown_status.get("web").unwrap();
    assert!(web.in_cooldown);
    assert_eq!(web.remaining_seconds, 200);
    assert_eq!(web.last_direction, ScalingDirection::Up);
    assert!(!status.cooldown_status.contains_key("api"));
}

// ── Loop ───────────────────────────────────────────────────────────

#[tokio::test]
async fn started_loop_evaluates_until_stopped() {
    let h = Harness::new(2);
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 50.0);

    let handle = h.autoscaler.start(Duration::from_millis(10));
    assert!(h.autoscaler.is_running());

    let mut waited = 0;
    while h.autoscaler.recent_decisions(10).await.len() < 2 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    assert!(h.autoscaler.recent_decisions(10).await.len() >= 2);

    handle.stop().await;
    assert!(!h.autoscaler.is_running());
    assert!(!h.autoscaler.status().await.running);

    let settled = h.autoscaler.recent_decisions(1000).await.len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.autoscaler.recent_decisions(1000).await.len(), settled);
}

#[tokio::test]
async fn loop_survives_panicking_collaborator() {
    let h = Harness::new(2);
    h.autoscaler.register_service(ServiceConfig::new("explodes")).await.unwrap();
    h.autoscaler.register_service(web_service()).await.unwrap();
    h.metrics.set_cpu("web", 50.0);

    let handle = h.autoscaler.start(Duration::from_millis(10));
    let mut waited = 0;
    while h.autoscaler.recent_decisions(10).await.len() < 3 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    handle.stop().await;

    let decisions = h.autoscaler.recent_decisions(100).await;
    assert!(decisions.len() >= 3);
    assert!(decisions.iter().all(|d| d.service_name == "web"));
}

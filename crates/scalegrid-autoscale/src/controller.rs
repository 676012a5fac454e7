//! Autoscaler — the control loop that owns the service registry.
//!
//! Each cycle, for every registered service, the autoscaler pulls metrics
//! and the current instance count from its collaborators, runs the
//! decision engine and the cooldown controller, records the result in a
//! bounded history, and hands actionable decisions to the executor.
//!
//! `Autoscaler` is a cheap `Clone` handle; clones share one registry,
//! history and cooldown map. Separately constructed autoscalers share
//! nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use scalegrid_core::{
    ActionLog, ActionRecord, BoxFuture, CustomMetrics, InfrastructureMetrics, InstanceSource,
    MetricsSource, ScaleExecutor, ScalegridConfig, ScalingDecision, ScalingMetric, ServiceConfig,
    SourceError, SourceResult,
};

use crate::cooldown::{self, CooldownState, CooldownStatus};
use crate::engine;
use crate::error::AutoscaleError;
use crate::history::{DEFAULT_HISTORY_CAPACITY, DecisionHistory};
use crate::signals::build_metrics;

/// Source of "now" as Unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall-clock `Clock`.
pub fn system_clock() -> Clock {
    Arc::new(epoch_secs)
}

/// Tunables for one autoscaler.
#[derive(Debug, Clone)]
pub struct AutoscalerSettings {
    /// Window passed to the infrastructure metrics source.
    pub metrics_window_minutes: u32,
    /// Upper bound for each collaborator call.
    pub fetch_timeout: Duration,
    /// Sleep after a cycle fails unexpectedly.
    pub error_backoff: Duration,
    pub history_capacity: usize,
    /// Number of decisions included in `status()`.
    pub status_decisions: usize,
    /// Services evaluated in parallel within a cycle.
    pub max_concurrency: usize,
}

impl Default for AutoscalerSettings {
    fn default() -> Self {
        Self {
            metrics_window_minutes: 5,
            fetch_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(30),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            status_decisions: 10,
            max_concurrency: 4,
        }
    }
}

impl AutoscalerSettings {
    pub fn from_config(config: &ScalegridConfig) -> Self {
        let a = &config.autoscaler;
        Self {
            metrics_window_minutes: a.metrics_window_minutes,
            fetch_timeout: config.fetch_timeout(),
            error_backoff: config.error_backoff(),
            history_capacity: a.history_capacity,
            status_decisions: a.status_decisions,
            max_concurrency: a.max_concurrency,
        }
    }
}

/// External systems the autoscaler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: Arc<dyn MetricsSource>,
    pub instances: Arc<dyn InstanceSource>,
    pub executor: Arc<dyn ScaleExecutor>,
    pub action_log: Arc<dyn ActionLog>,
}

/// Snapshot returned by [`Autoscaler::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalerStatus {
    pub running: bool,
    pub managed_services: Vec<String>,
    /// Most recent decisions, oldest first.
    pub last_decisions: Vec<ScalingDecision>,
    /// Services that have acted at least once.
    pub cooldown_status: BTreeMap<String, CooldownStatus>,
}

struct Inner {
    collaborators: Collaborators,
    settings: AutoscalerSettings,
    clock: Clock,
    registry: RwLock<HashMap<String, ServiceConfig>>,
    history: RwLock<DecisionHistory>,
    cooldowns: RwLock<CooldownState>,
    /// Serializes evaluations of the same service.
    service_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    running: AtomicBool,
}

/// The adaptive autoscaling control loop.
#[derive(Clone)]
pub struct Autoscaler {
    inner: Arc<Inner>,
}

impl Autoscaler {
    /// Create an autoscaler using the wall clock.
    pub fn new(collaborators: Collaborators, settings: AutoscalerSettings) -> Self {
        Self::with_clock(collaborators, settings, system_clock())
    }

    /// Create an autoscaler with an explicit clock.
    pub fn with_clock(collaborators: Collaborators, settings: AutoscalerSettings, clock: Clock) -> Self {
        let history = DecisionHistory::new(settings.history_capacity);
        Self {
            inner: Arc::new(Inner {
                collaborators,
                settings,
                clock,
                registry: RwLock::new(HashMap::new()),
                history: RwLock::new(history),
                cooldowns: RwLock::new(CooldownState::new()),
                service_locks: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> &AutoscalerSettings {
        &self.inner.settings
    }

    fn now(&self) -> u64 {
        (self.inner.clock)()
    }

    // ── Registry ───────────────────────────────────────────────────

    /// Validate and insert (or replace) a service config.
    ///
    /// Replacing a config keeps the service's cooldown record.
    pub async fn register_service(&self, config: ServiceConfig) -> Result<(), AutoscaleError> {
        config.validate()?;
        info!(
            service = %config.name,
            min = config.min_instances,
            max = config.max_instances,
            "service registered"
        );
        self.inner
            .registry
            .write()
            .await
            .insert(config.name.clone(), config);
        Ok(())
    }

    /// Remove a service and its cooldown state. Returns true if it existed.
    ///
    /// Waits for an in-flight evaluation of the service to finish, so
    /// nothing it commits outlives the removal.
    pub async fn remove_service(&self, name: &str) -> bool {
        let lock = self
            .inner
            .service_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let existed = self.inner.registry.write().await.remove(name).is_some();
        self.inner.cooldowns.write().await.remove(name);
        self.inner.service_locks.lock().await.remove(name);
        if existed {
            info!(service = %name, "service deregistered");
        }
        existed
    }

    pub async fn get_service(&self, name: &str) -> Option<ServiceConfig> {
        self.inner.registry.read().await.get(name).cloned()
    }

    /// Registered service configs, ordered by name.
    pub async fn services(&self) -> Vec<ServiceConfig> {
        let mut services: Vec<ServiceConfig> =
            self.inner.registry.read().await.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    // ── Evaluation ─────────────────────────────────────────────────

    /// Evaluate one service right now, outside the periodic loop.
    ///
    /// Runs the same step as a loop cycle: cooldown applies, the decision
    /// is recorded, and an actionable decision is executed.
    pub async fn evaluate_once(&self, name: &str) -> Result<ScalingDecision, AutoscaleError> {
        self.process_service(name).await
    }

    /// Evaluate every registered service once.
    pub async fn run_cycle(&self) -> Vec<ScalingDecision> {
        self.cycle(None).await
    }

    async fn cycle(&self, shutdown: Option<watch::Receiver<bool>>) -> Vec<ScalingDecision> {
        let mut names: Vec<String> = self.inner.registry.read().await.keys().cloned().collect();
        names.sort();

        let semaphore = Arc::new(Semaphore::new(self.inner.settings.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for name in names {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                debug!("shutdown requested, ending cycle early");
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = this.process_service(&name).await;
                (name, result)
            });
        }

        let mut decisions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(decision))) => decisions.push(decision),
                Ok((name, Err(e))) => {
                    warn!(service = %name, error = %e, "service skipped this cycle");
                }
                Err(e) => {
                    error!(error = %e, "service evaluation task failed");
                }
            }
        }

        debug!(
            decisions = decisions.len(),
            actions = decisions.iter().filter(|d| d.is_action()).count(),
            "autoscaler cycle complete"
        );
        decisions
    }

    async fn process_service(&self, name: &str) -> Result<ScalingDecision, AutoscaleError> {
        let (config, _guard) = self.acquire_service(name).await?;

        let limit = self.inner.settings.fetch_timeout;
        let collaborators = &self.inner.collaborators;
        let current = bounded(limit, collaborators.instances.current_instances(name))
            .await
            .map_err(AutoscaleError::InstanceCount)?;

        let metrics = self.collect_metrics(&config).await;

        // Decide, apply cooldown and record as one step; nothing awaits
        // once both locks are held.
        let decision = {
            let mut cooldowns = self.inner.cooldowns.write().await;
            let mut history = self.inner.history.write().await;
            let now = self.now();
            let raw = engine::decide(&config, current, metrics, now);
            let decision = cooldown::apply_cooldown(raw, &config, &mut cooldowns, now);
            history.push(decision.clone());
            decision
        };

        debug!(
            service = %name,
            direction = %decision.direction,
            current = decision.current_instances,
            target = decision.target_instances,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "service evaluated"
        );

        if decision.is_action() {
            self.execute(&decision).await;
        }
        Ok(decision)
    }

    async fn collect_metrics(&self, config: &ServiceConfig) -> Vec<ScalingMetric> {
        let limit = self.inner.settings.fetch_timeout;
        let source = &self.inner.collaborators.metrics;
        let window = self.inner.settings.metrics_window_minutes;

        let (infra, custom) = tokio::join!(
            bounded(limit, source.fetch_infrastructure(&config.name, window)),
            bounded(limit, source.fetch_custom(&config.name)),
        );

        let infra = infra.unwrap_or_else(|e| {
            warn!(service = %config.name, error = %e, "infrastructure metrics unavailable");
            InfrastructureMetrics::default()
        });
        let custom = custom.unwrap_or_else(|e| {
            warn!(service = %config.name, error = %e, "custom metrics unavailable");
            CustomMetrics::default()
        });

        build_metrics(config, &infra, &custom)
    }

    async fn execute(&self, decision: &ScalingDecision) {
        let limit = self.inner.settings.fetch_timeout;
        let collaborators = &self.inner.collaborators;

        let success = match bounded(limit, collaborators.executor.execute(decision)).await {
            Ok(true) => {
                info!(
                    service = %decision.service_name,
                    direction = %decision.direction,
                    from = decision.current_instances,
                    to = decision.target_instances,
                    confidence = decision.confidence,
                    "scaling action executed"
                );
                true
            }
            Ok(false) => {
                error!(
                    service = %decision.service_name,
                    direction = %decision.direction,
                    to = decision.target_instances,
                    "scaling action rejected by executor"
                );
                false
            }
            Err(e) => {
                error!(
                    service = %decision.service_name,
                    direction = %decision.direction,
                    to = decision.target_instances,
                    error = %e,
                    "scaling action failed"
                );
                false
            }
        };

        let record = ActionRecord::from_decision(decision, success);
        if let Err(e) = bounded(limit, collaborators.action_log.append(record)).await {
            warn!(service = %decision.service_name, error = %e, "failed to append action log");
        }
    }

    /// Take the service's evaluation lock and read its config under it.
    ///
    /// Unknown services never get a lock entry. If `remove_service` drops
    /// the entry while we wait, the lookup starts over.
    async fn acquire_service(
        &self,
        name: &str,
    ) -> Result<(ServiceConfig, OwnedMutexGuard<()>), AutoscaleError> {
        loop {
            if !self.inner.registry.read().await.contains_key(name) {
                return Err(AutoscaleError::UnknownService(name.to_string()));
            }

            let lock = {
                let mut locks = self.inner.service_locks.lock().await;
                locks.entry(name.to_string()).or_default().clone()
            };
            let guard = lock.clone().lock_owned().await;

            let mut locks = self.inner.service_locks.lock().await;
            if !locks.get(name).is_some_and(|current| Arc::ptr_eq(current, &lock)) {
                continue;
            }
            match self.inner.registry.read().await.get(name).cloned() {
                Some(config) => return Ok((config, guard)),
                None => {
                    // Removed between the first lookup and the insert above.
                    locks.remove(name);
                    return Err(AutoscaleError::UnknownService(name.to_string()));
                }
            }
        }
    }

    #[cfg(test)]
    async fn lock_entries(&self) -> usize {
        self.inner.service_locks.lock().await.len()
    }

    // ── Loop ───────────────────────────────────────────────────────

    /// Run the control loop until `shutdown` flips to true (or its sender
    /// is dropped).
    ///
    /// A cycle in progress finishes the services it has started before the
    /// loop exits. A cycle that panics is logged and retried after
    /// `error_backoff`.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = interval.as_secs(),
            "autoscaler started"
        );

        loop {
            let cycle = {
                let this = self.clone();
                let rx = shutdown.clone();
                tokio::spawn(async move { this.cycle(Some(rx)).await })
            };

            let pause = match cycle.await {
                Ok(_) => interval,
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_secs = self.inner.settings.error_backoff.as_secs(),
                        "autoscaler cycle failed"
                    );
                    self.inner.settings.error_backoff
                }
            };

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.inner.running.store(false, Ordering::SeqCst);
        info!("autoscaler shutting down");
    }

    /// Spawn the control loop on the current runtime.
    pub fn start(&self, interval: Duration) -> AutoscalerHandle {
        let (shutdown, rx) = watch::channel(false);
        self.inner.running.store(true, Ordering::SeqCst);
        let this = self.clone();
        let task = tokio::spawn(async move { this.run(interval, rx).await });
        AutoscalerHandle { shutdown, task }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Read-only snapshot of the autoscaler's state.
    pub async fn status(&self) -> AutoscalerStatus {
        let now = self.now();
        let services = self.services().await;

        // Locks are taken one at a time.
        let last_decisions = self
            .inner
            .history
            .read()
            .await
            .recent(self.inner.settings.status_decisions);

        let cooldown_status = {
            let cooldowns = self.inner.cooldowns.read().await;
            services
                .iter()
                .filter_map(|c| cooldowns.status(&c.name, c, now).map(|s| (c.name.clone(), s)))
                .collect()
        };

        AutoscalerStatus {
            running: self.is_running(),
            managed_services: services.into_iter().map(|c| c.name).collect(),
            last_decisions,
            cooldown_status,
        }
    }

    /// Up to `limit` most recent decisions, oldest first.
    pub async fn recent_decisions(&self, limit: usize) -> Vec<ScalingDecision> {
        self.inner.history.read().await.recent(limit)
    }

    /// The newest decision of every registered service that has one,
    /// ordered by service name.
    pub async fn latest_decisions(&self) -> Vec<ScalingDecision> {
        let services = self.services().await;
        let history = self.inner.history.read().await;
        services
            .iter()
            .filter_map(|c| history.recent_for(&c.name, 1).pop())
            .collect()
    }

    /// Up to `limit` most recent decisions for one service, oldest first.
    pub async fn decisions_for(&self, service: &str, limit: usize) -> Vec<ScalingDecision> {
        self.inner.history.read().await.recent_for(service, limit)
    }
}

/// Handle to a control loop started with [`Autoscaler::start`].
pub struct AutoscalerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoscalerHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "autoscaler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Await a collaborator call for at most `limit`.
async fn bounded<T>(limit: Duration, call: BoxFuture<'_, SourceResult<T>>) -> SourceResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

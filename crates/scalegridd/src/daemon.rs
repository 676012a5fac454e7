//! Daemon wiring — assembles the store, collaborators, autoscaler and API.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use scalegrid_api::{ApiState, build_router};
use scalegrid_autoscale::{Autoscaler, AutoscalerSettings, Collaborators};
use scalegrid_core::config::{ExecutorConfig, ExecutorMode};
use scalegrid_core::{ScaleExecutor, ScalegridConfig, ServiceConfig};
use scalegrid_metrics::{StoreActionLog, StoreMetrics};
use scalegrid_state::StateStore;

use crate::executor::{DryRunExecutor, WebhookExecutor};

/// How often expired metric samples are pruned.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the daemon until Ctrl-C.
pub async fn run(config: ScalegridConfig, port: u16, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    info!("ScaleGrid daemon starting");

    // Ensure data directory exists.
    let data_dir = data_dir.unwrap_or_else(|| config.store.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("scalegrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let metrics = StoreMetrics::new(store.clone());
    let executor = build_executor(&config.executor, metrics.clone(), config.fetch_timeout())?;
    let collaborators = Collaborators {
        metrics: Arc::new(metrics.clone()),
        instances: Arc::new(metrics.clone()),
        executor,
        action_log: Arc::new(StoreActionLog::new(
            store.clone(),
            config.store.action_log_retention,
        )),
    };

    let autoscaler = Autoscaler::new(collaborators, AutoscalerSettings::from_config(&config));
    let registered = register_services(&autoscaler, &store, &config.services).await?;
    info!(services = registered, "autoscaler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let interval = config.interval();
    let loop_autoscaler = autoscaler.clone();
    let autoscale_shutdown = shutdown_rx.clone();
    let autoscale_handle = tokio::spawn(async move {
        loop_autoscaler.run(interval, autoscale_shutdown).await;
    });

    let prune_metrics = metrics.clone();
    let retention = config.sample_retention();
    let prune_handle = tokio::spawn(async move {
        prune_loop(prune_metrics, retention, PRUNE_INTERVAL, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        autoscaler,
        metrics,
        store,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Wait for background tasks.
    let _ = autoscale_handle.await;
    let _ = prune_handle.await;

    info!("ScaleGrid daemon stopped");
    Ok(())
}

/// Pick the executor named by `[executor]`.
pub fn build_executor(
    config: &ExecutorConfig,
    metrics: StoreMetrics,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn ScaleExecutor>> {
    match config.mode {
        ExecutorMode::DryRun => {
            info!("executor: dry run");
            Ok(Arc::new(DryRunExecutor::new(metrics)))
        }
        ExecutorMode::Webhook => {
            let address = config
                .webhook_address
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("executor mode 'webhook' requires webhook_address"))?;
            info!(%address, path = %config.webhook_path, "executor: webhook");
            Ok(Arc::new(WebhookExecutor::new(address, &config.webhook_path, timeout)))
        }
    }
}

/// Register configured services, then any previously persisted ones the
/// config does not mention. Configured services are persisted so API
/// reads and restarts see them. Returns the number registered.
pub async fn register_services(
    autoscaler: &Autoscaler,
    store: &StateStore,
    configured: &[ServiceConfig],
) -> anyhow::Result<usize> {
    let mut names = HashSet::new();
    for service in configured {
        autoscaler.register_service(service.clone()).await?;
        store.put_service(service)?;
        names.insert(service.name.clone());
    }

    let mut restored = 0;
    for service in store.list_services()? {
        if names.contains(&service.name) {
            continue;
        }
        let name = service.name.clone();
        match autoscaler.register_service(service).await {
            Ok(()) => {
                restored += 1;
                names.insert(name);
            }
            Err(e) => warn!(service = %name, error = %e, "skipping invalid persisted service"),
        }
    }
    debug!(configured = configured.len(), restored, "services registered");
    Ok(names.len())
}

/// Periodically drop samples older than `retention`.
async fn prune_loop(
    metrics: StoreMetrics,
    retention: Duration,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(every) => {
                if let Err(e) = metrics.prune(retention) {
                    warn!(error = %e, "sample pruning failed");
                }
            }
            _ = shutdown.changed() => {
                debug!("sample pruning shutting down");
                break;
            }
        }
    }
}

//! Prediction Market Engine - Entry Point
//!
//! Initializes configuration, logging, storage and the market engine,
//! then runs the background tasks until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate into the first engine record
//! 2. Init tracing (JSON structured logging)
//! 3. Open the snapshot store and restore the last snapshot
//! 4. Load voter attribution keys
//! 5. Open the audit log + metrics registry, spawn the event sink
//! 6. Build the `MarketEngine` over the in-memory stores
//! 7. Spawn health server (/live, /ready, /status) and metrics server
//! 8. Spawn config watcher (hot reload every 60s)
//! 9. Spawn aggregation scheduler (lifecycle sweep)
//! 10. Spawn snapshot loop
//! 11. Wait for SIGINT → graceful shutdown (stop→snapshot→drain→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use prediction_market_engine::adapters::clock::SystemClock;
use prediction_market_engine::adapters::memory::{
    InMemoryMarketRepository, InMemoryVoteStore, StaticIdentity,
};
use prediction_market_engine::adapters::metrics::{
    EngineMetrics, EventSink, HealthServer, HealthState,
};
use prediction_market_engine::adapters::persistence::{AuditLog, EngineSnapshot, SnapshotStore};
use prediction_market_engine::config::{self, EngineConfig};
use prediction_market_engine::config::hot_reload::ConfigWatcher;
use prediction_market_engine::ports::{MarketRepository, VoteStore};
use prediction_market_engine::usecases::{AggregationScheduler, MarketEngine};

type Engine = MarketEngine<InMemoryMarketRepository, InMemoryVoteStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("MARKET_ENGINE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    // ── 1. Load configuration from config.toml ──────────────
    let app = config::loader::load_config(&config_path).context("Failed to load configuration")?;
    let record = EngineConfig::from_app(&app, 1).context("Invalid engine rules")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&app.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %app.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config_version = record.version,
        global_pause = record.global_pause,
        "Starting prediction market engine"
    );

    // ── Shutdown and config channels ────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let config_tx = Arc::new(watch::Sender::new(record));
    let health = Arc::new(HealthState::new());

    // ── 3. Storage + restore ────────────────────────────────
    let repo = Arc::new(InMemoryMarketRepository::new());
    let votes = Arc::new(InMemoryVoteStore::new());
    let snapshots = Arc::new(
        SnapshotStore::new(&app.persistence.data_dir)
            .await
            .context("Failed to open snapshot store")?,
    );
    if let Some(snapshot) = snapshots.load().await.context("Failed to load snapshot")? {
        info!(
            taken_at = %snapshot.taken_at,
            markets = snapshot.markets.len(),
            votes = snapshot.votes.len(),
            "Restoring engine state"
        );
        snapshot.restore_into(&repo, &votes).await;
    }

    // ── 4. Voter attribution keys ───────────────────────────
    let identity = match &app.service.voter_keys_file {
        Some(path) => StaticIdentity::from_json_file(path)?,
        None => {
            warn!("No voter_keys_file configured: every vote will fail attribution");
            StaticIdentity::new()
        }
    };

    // ── 5. Event sink: audit log + metrics ──────────────────
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut sink = EventSink::new();
    let metrics = if app.metrics.enabled {
        let metrics = Arc::new(EngineMetrics::new().context("Failed to register metrics")?);
        metrics.config_version.set(i64::try_from(config_tx.borrow().version).unwrap_or(i64::MAX));
        sink = sink.with_metrics(Arc::clone(&metrics));
        Some(metrics)
    } else {
        None
    };
    if app.persistence.audit_log {
        let audit = AuditLog::open(&app.persistence.data_dir)
            .await
            .context("Failed to open audit log")?;
        sink = sink.with_audit(Arc::new(audit));
    }
    let sink_handle = tokio::spawn(sink.run(events_rx));

    // ── 6. Engine ───────────────────────────────────────────
    let engine: Arc<Engine> = Arc::new(
        MarketEngine::new(
            Arc::clone(&repo),
            Arc::clone(&votes),
            Arc::new(identity),
            Arc::new(SystemClock),
            Arc::clone(&config_tx),
        )
        .with_events(events_tx),
    );

    // ── 7. Health + metrics servers ─────────────────────────
    let health_server = HealthServer::new(Arc::clone(&health), app.metrics.bind_address.clone());
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = metrics.map(|metrics| {
        let bind = metrics_bind_address(&app.metrics.bind_address);
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    // ── 8. Config hot reload ────────────────────────────────
    let mut watcher = ConfigWatcher::new(&config_path, Arc::clone(&config_tx));
    let watcher_shutdown = shutdown_tx.subscribe();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(watcher_shutdown).await {
            error!(error = %e, "Config watcher failed");
        }
    });

    // ── 9. Aggregation scheduler ────────────────────────────
    let scheduler = AggregationScheduler::new(
        Arc::clone(&engine),
        Duration::from_secs(app.service.aggregation_interval_seconds.max(1)),
    );
    let scheduler_shutdown = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    // ── 10. Snapshot loop ───────────────────────────────────
    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&engine),
        Arc::clone(&snapshots),
        Arc::clone(&health),
        Duration::from_secs(app.persistence.snapshot_interval_seconds.max(1)),
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned: engine is running");

    // ── 11. Wait for SIGINT ─────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Mark unready, then signal all tasks to stop
    health.engine_running.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(());

    // 2. Wait for the scheduler and snapshot loop (up to 30s)
    let _ = tokio::time::timeout(Duration::from_secs(30), scheduler_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(30), snapshot_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;

    // 3. Final snapshot
    let config_version = config_tx.borrow().version;
    let snapshot = EngineSnapshot::capture(&repo, &votes, config_version).await;
    if let Err(e) = snapshots.save(&snapshot).await {
        error!(critical = true, error = %e, "Final snapshot failed");
    }

    // 4. Drop the last engine handle so the sink drains and exits
    drop(engine);
    let _ = tokio::time::timeout(Duration::from_secs(10), sink_handle).await;

    // 5. Stop servers
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Metrics are served one port above the health server.
fn metrics_bind_address(health_bind: &str) -> String {
    match health_bind.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => format!("{host}:{}", port.saturating_add(1)),
            Err(_) => health_bind.to_string(),
        },
        None => health_bind.to_string(),
    }
}

/// Periodically snapshot the stores and refresh storage health.
async fn run_snapshots(
    engine: Arc<Engine>,
    store: Arc<SnapshotStore>,
    health: Arc<HealthState>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Snapshot loop received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                let repo = engine.repository();
                let healthy = repo.is_healthy().await
                    && engine.votes().is_healthy().await
                    && store.is_healthy().await;
                health.storage_healthy.store(healthy, Ordering::Relaxed);
                health
                    .halted_markets
                    .store(engine.halted_markets().len(), Ordering::Relaxed);

                let snapshot =
                    EngineSnapshot::capture(repo, engine.votes(), engine.config().version).await;
                if let Err(e) = store.save(&snapshot).await {
                    warn!(error = %e, "Periodic snapshot failed");
                    health.storage_healthy.store(false, Ordering::Relaxed);
                }
            }
        }
    }
}

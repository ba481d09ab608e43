//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker health
//! checks and monitoring. Readiness depends on storage health and on the
//! engine not being in graceful shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Cleared at the start of graceful shutdown.
    pub engine_running: AtomicBool,
    /// Last storage health probe result.
    pub storage_healthy: AtomicBool,
    /// Markets currently halted on an invariant violation.
    pub halted_markets: AtomicUsize,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    ready: bool,
    engine_running: bool,
    storage_healthy: bool,
    halted_markets: usize,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (all healthy by default).
    pub const fn new() -> Self {
        Self {
            engine_running: AtomicBool::new(true),
            storage_healthy: AtomicBool::new(true),
            halted_markets: AtomicUsize::new(0),
        }
    }

    /// Check if the engine is ready to serve traffic.
    ///
    /// A halted market does not make the engine unready; it is reported
    /// on `/status` for operators.
    pub fn is_ready(&self) -> bool {
        self.engine_running.load(Ordering::Relaxed) && self.storage_healthy.load(Ordering::Relaxed)
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    state: Arc<HealthState>,
    bind_address: String,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, bind_address: String) -> Self {
        Self { state, bind_address }
    }

    pub fn router(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/status", get(Self::status))
            .with_state(state)
    }

    /// Start the health check server.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 503 during shutdown or when storage is unhealthy.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn status(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        Json(StatusBody {
            ready: state.is_ready(),
            engine_running: state.engine_running.load(Ordering::Relaxed),
            storage_healthy: state.storage_healthy.load(Ordering::Relaxed),
            halted_markets: state.halted_markets.load(Ordering::Relaxed),
        })
    }
}

//! Prometheus Metrics Registry - Engine Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Counters are driven by the engine event stream (see
//! [`EngineMetrics::record`]); nothing in the engine calls them directly.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::trade::TradeKind;
use crate::usecases::EngineEvent;

/// Centralized Prometheus metrics for the engine.
///
/// All metrics follow the naming convention `market_engine_*`.
pub struct EngineMetrics {
    registry: Registry,
    /// Every event by kind.
    pub events: IntCounterVec,
    /// Executed trades by direction and side.
    pub trades: IntCounterVec,
    /// Curve volume (cost or gross proceeds) by side.
    pub volume: CounterVec,
    /// Fees charged across all markets.
    pub fees_collected: Counter,
    /// Lifecycle transitions.
    pub transitions: IntCounterVec,
    /// Votes accepted by phase.
    pub votes: IntCounterVec,
    /// Total paid out to claimants.
    pub claims_paid: Counter,
    /// Invariant violations (each one halts a market).
    pub invariant_violations: IntCounter,
    /// Config record version in force.
    pub config_version: IntGauge,
    /// Latest YES price per market.
    pub price_yes: GaugeVec,
}

impl EngineMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            Opts::new("market_engine_events_total", "Engine events by kind"),
            &["kind"],
        )?;
        let trades = IntCounterVec::new(
            Opts::new("market_engine_trades_total", "Executed trades"),
            &["kind", "side"],
        )?;
        let volume = CounterVec::new(
            Opts::new("market_engine_volume_total", "Curve volume traded"),
            &["side"],
        )?;
        let fees_collected = Counter::new("market_engine_fees_collected_total", "Trading fees charged")?;
        let transitions = IntCounterVec::new(
            Opts::new("market_engine_transitions_total", "Market lifecycle transitions"),
            &["from", "to"],
        )?;
        let votes = IntCounterVec::new(
            Opts::new("market_engine_votes_total", "Accepted governance votes"),
            &["phase"],
        )?;
        let claims_paid = Counter::new("market_engine_claims_paid_total", "Settlement payouts")?;
        let invariant_violations = IntCounter::new(
            "market_engine_invariant_violations_total",
            "Invariant violations detected (market halted)",
        )?;
        let config_version = IntGauge::new("market_engine_config_version", "Config record version")?;
        let price_yes = GaugeVec::new(
            Opts::new("market_engine_price_yes", "Latest YES price"),
            &["market_id"],
        )?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(trades.clone()))?;
        registry.register(Box::new(volume.clone()))?;
        registry.register(Box::new(fees_collected.clone()))?;
        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(votes.clone()))?;
        registry.register(Box::new(claims_paid.clone()))?;
        registry.register(Box::new(invariant_violations.clone()))?;
        registry.register(Box::new(config_version.clone()))?;
        registry.register(Box::new(price_yes.clone()))?;

        Ok(Self {
            registry,
            events,
            trades,
            volume,
            fees_collected,
            transitions,
            votes,
            claims_paid,
            invariant_violations,
            config_version,
            price_yes,
        })
    }

    /// Update the metrics for one engine event.
    pub fn record(&self, event: &EngineEvent) {
        self.events.with_label_values(&[event.kind()]).inc();
        match event {
            EngineEvent::TradeExecuted {
                market_id,
                kind,
                side,
                amount,
                fees,
                price_yes,
                ..
            } => {
                let kind = match kind {
                    TradeKind::Buy => "buy",
                    TradeKind::Sell => "sell",
                };
                let side = side.to_string();
                self.trades.with_label_values(&[kind, side.as_str()]).inc();
                self.volume.with_label_values(&[side.as_str()]).inc_by(amount.to_f64());
                self.fees_collected.inc_by(fees.to_f64());
                self.price_yes
                    .with_label_values(&[market_id.as_str()])
                    .set(price_yes.to_f64());
            }
            EngineEvent::StateChanged { from, to, .. } => {
                let (from, to) = (from.to_string(), to.to_string());
                self.transitions.with_label_values(&[from.as_str(), to.as_str()]).inc();
            }
            EngineEvent::VoteRecorded { phase, .. } => {
                let phase = phase.to_string();
                self.votes.with_label_values(&[phase.as_str()]).inc();
            }
            EngineEvent::Claimed { payout, .. } => self.claims_paid.inc_by(payout.to_f64()),
            EngineEvent::InvariantViolation { .. } => self.invariant_violations.inc(),
            EngineEvent::ConfigUpdated { version, .. } => {
                self.config_version.set(i64::try_from(*version).unwrap_or(i64::MAX));
            }
            _ => {}
        }
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

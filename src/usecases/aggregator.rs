//! Aggregation Scheduler - Periodic Lifecycle Sweep
//!
//! Every `interval` the scheduler walks all markets and drives the
//! time- and vote-based transitions nobody triggers explicitly:
//! - ACTIVE past expiry → RESOLVING
//! - RESOLVING with an undisputed resolution past its window → FINALIZED
//! - PROPOSED / DISPUTED → re-tally and apply (a dispute whose voting
//!   period has closed is settled even without quorum)
//!
//! A failure on one market is logged and counted; the sweep carries on.
//! Every step is idempotent, so an operator may also trigger it manually.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::engine::MarketEngine;
use super::governance::AggregationOutcome;
use crate::domain::error::MarketError;
use crate::domain::market::{Market, MarketState};
use crate::ports::{MarketRepository, VoteStore};

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Markets inspected.
  pub scanned: usize,
  /// Markets moved from ACTIVE to RESOLVING.
  pub expired: usize,
  /// Markets finalized after an undisputed window.
  pub finalized: usize,
  /// Tallies that changed a market's state.
  pub transitioned: usize,
  /// Tallies below quorum or threshold.
  pub unchanged: usize,
  /// Per-market failures other than a missed quorum.
  pub failed: usize,
}

/// Runs the lifecycle sweep on a fixed interval.
pub struct AggregationScheduler<R: MarketRepository, V: VoteStore> {
  engine: Arc<MarketEngine<R, V>>,
  interval: Duration,
}

impl<R: MarketRepository, V: VoteStore> AggregationScheduler<R, V> {
  pub fn new(engine: Arc<MarketEngine<R, V>>, interval: Duration) -> Self {
    Self { engine, interval }
  }

  /// Sweep every `interval` until shutdown.
  #[instrument(skip_all, name = "aggregation_loop")]
  pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(interval_secs = self.interval.as_secs(), "Aggregation scheduler started");
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Aggregation scheduler received shutdown signal");
          break;
        }
        _ = ticker.tick() => {
          match self.run_once().await {
            Ok(report) => debug!(?report, "Sweep finished"),
            Err(e) => warn!(error = %e, "Sweep could not list markets"),
          }
        }
      }
    }
  }

  /// One pass over every market.
  pub async fn run_once(&self) -> Result<SweepReport, MarketError> {
    let markets = self.engine.markets().await?;
    let now = self.engine.now();
    let dispute_window = self.engine.config().dispute_window();
    let mut report = SweepReport {
      scanned: markets.len(),
      ..SweepReport::default()
    };

    for market in &markets {
      if self.engine.is_halted(&market.id) {
        continue;
      }
      match market.state() {
        MarketState::Active if market.is_expired(now) => {
          match self.engine.expire(&market.id).await {
            Ok(()) => report.expired += 1,
            Err(e) => Self::record_failure(&mut report, market, &e),
          }
        }
        MarketState::Resolving if window_elapsed(market, now, dispute_window) => {
          match self.engine.finalize(&market.id).await {
            Ok(_) => report.finalized += 1,
            Err(e) => Self::record_failure(&mut report, market, &e),
          }
        }
        MarketState::Proposed | MarketState::Disputed => {
          match self.engine.trigger_aggregation(&market.id).await {
            Ok(AggregationOutcome::Transitioned { .. }) => report.transitioned += 1,
            Ok(AggregationOutcome::Unchanged { .. }) => report.unchanged += 1,
            Ok(AggregationOutcome::NotApplicable { .. }) => {}
            Err(MarketError::QuorumNotMet { votes, quorum }) => {
              debug!(market_id = %market.id, votes, quorum, "Quorum not met: waiting for votes");
              report.unchanged += 1;
            }
            Err(e) => Self::record_failure(&mut report, market, &e),
          }
        }
        _ => {}
      }
    }

    if report.expired + report.finalized + report.transitioned + report.failed > 0 {
      info!(
        scanned = report.scanned,
        expired = report.expired,
        finalized = report.finalized,
        transitioned = report.transitioned,
        unchanged = report.unchanged,
        failed = report.failed,
        "Lifecycle sweep complete"
      );
    }
    Ok(report)
  }

  fn record_failure(report: &mut SweepReport, market: &Market, err: &MarketError) {
    warn!(market_id = %market.id, state = %market.state(), error = %err, "Sweep step failed");
    report.failed += 1;
  }
}

fn window_elapsed(market: &Market, now: DateTime<Utc>, window: chrono::Duration) -> bool {
  market
    .resolution()
    .and_then(|r| r.proposed_at.checked_add_signed(window))
    .is_some_and(|closes_at| now >= closes_at)
}

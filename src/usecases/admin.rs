//! Admin Use Case - Pauses, Cancellation, Halts and Rule Updates
//!
//! Every operation here requires the actor to hold the admin role in the
//! configuration snapshot taken at entry.

use tracing::{error, info, instrument, warn};

use super::engine::MarketEngine;
use super::events::EngineEvent;
use crate::config::EngineConfig;
use crate::domain::error::MarketError;
use crate::domain::fixed_point::Fixed;
use crate::ports::{MarketRepository, VoteStore};

impl<R: MarketRepository, V: VoteStore> MarketEngine<R, V> {
  /// Stop trading on one market.
  #[instrument(skip(self))]
  pub async fn pause_market(&self, actor: &str, market_id: &str) -> Result<(), MarketError> {
    self.set_market_paused(actor, market_id, true).await
  }

  /// Resume trading on one market.
  #[instrument(skip(self))]
  pub async fn resume_market(&self, actor: &str, market_id: &str) -> Result<(), MarketError> {
    self.set_market_paused(actor, market_id, false).await
  }

  async fn set_market_paused(&self, actor: &str, market_id: &str, paused: bool) -> Result<(), MarketError> {
    let config = self.config();
    self.require_admin(&config, actor, "pause market")?;

    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    if market.is_paused() == paused {
      return Ok(());
    }
    market.set_paused(paused)?;
    self.persist(&mut market, &mut []).await?;

    warn!(paused, "Market pause toggled");
    self.emit(EngineEvent::PauseChanged {
      market_id: Some(market_id.to_string()),
      paused,
      at: self.clock.now(),
    });
    Ok(())
  }

  /// Flip the engine-wide trading switch. Published as a new config version.
  ///
  /// Only the flag changes; every other rule in the current record is kept,
  /// including one published concurrently.
  #[instrument(skip(self))]
  pub fn set_global_pause(&self, actor: &str, paused: bool) -> Result<u64, MarketError> {
    let config = self.config();
    self.require_admin(&config, actor, "set global pause")?;

    let mut version = 0;
    self.config.send_modify(|record| {
      record.global_pause = paused;
      record.version += 1;
      version = record.version;
    });

    warn!(paused, version, "Global pause toggled");
    self.emit(EngineEvent::ConfigUpdated {
      version,
      actor: actor.to_string(),
      at: self.clock.now(),
    });
    self.emit(EngineEvent::PauseChanged {
      market_id: None,
      paused,
      at: self.clock.now(),
    });
    Ok(version)
  }

  /// Cancel a market that has not started trading. Returns the backing to refund.
  #[instrument(skip(self))]
  pub async fn cancel_market(&self, actor: &str, market_id: &str) -> Result<Fixed, MarketError> {
    let config = self.config();
    self.require_admin(&config, actor, "cancel market")?;

    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let from = market.state();
    let refund = market.cancel(self.clock.now())?;
    self.persist(&mut market, &mut []).await?;

    info!(refund = %refund, "Market cancelled");
    self.emit_transition(market_id, from, market.state());
    Ok(refund)
  }

  /// Validate and publish a new rules record.
  ///
  /// The record is rejected whole if any field is invalid. Its version is
  /// assigned here (current + 1); the caller's value is ignored.
  #[instrument(skip(self, next))]
  pub fn update_config(&self, actor: &str, mut next: EngineConfig) -> Result<u64, MarketError> {
    let current = self.config();
    self.require_admin(&current, actor, "update configuration")?;
    next.validate()?;

    // Admin updates and file reloads share one sender; bump atomically.
    let mut version = 0;
    self.config.send_modify(|record| {
      next.version = record.version + 1;
      version = next.version;
      *record = next;
    });

    info!(version, "Configuration updated");
    self.emit(EngineEvent::ConfigUpdated {
      version,
      actor: actor.to_string(),
      at: self.clock.now(),
    });
    Ok(version)
  }

  /// Lift an invariant halt after operator review.
  ///
  /// The stored record is re-checked first; a market that still violates
  /// its invariants stays halted.
  #[instrument(skip(self))]
  pub async fn release_halt(&self, actor: &str, market_id: &str) -> Result<bool, MarketError> {
    let config = self.config();
    self.require_admin(&config, actor, "release halt")?;

    let _guard = self.locks.acquire(market_id).await;
    let market = self.market(market_id).await?;
    if let Err(err) = market.check_invariants() {
      error!(critical = true, error = %err, "Halt release refused: invariants still violated");
      return Err(err);
    }
    let released = self.clear_halt(market_id);
    if released {
      warn!("Market halt released");
    }
    Ok(released)
  }
}

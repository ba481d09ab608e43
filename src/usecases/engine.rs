//! Market Engine - Orchestration of the Domain over the Ports
//!
//! `MarketEngine` is the single entry point for every operation on
//! markets. Operations are grouped in sibling modules:
//! - `trading`: buy, sell, quotes
//! - `governance`: creation, votes, aggregation, resolution, disputes
//! - `settlement`: claims and liquidity withdrawal
//! - `admin`: pauses, cancellation, halts, configuration updates
//!
//! Each mutating operation follows the same shape:
//! 1. snapshot the current `EngineConfig`
//! 2. take the market's lock
//! 3. load the market (rejecting halted markets and re-checking invariants)
//! 4. validate and mutate local copies through the domain
//! 5. check invariants, bump versions, commit atomically
//! 6. log and emit an `EngineEvent`
//!
//! A failure at any step before the commit leaves storage untouched.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

use super::events::EngineEvent;
use super::locks::MarketLocks;
use crate::config::EngineConfig;
use crate::domain::error::MarketError;
use crate::domain::fees::FeeBreakdown;
use crate::domain::fixed_point::Fixed;
use crate::domain::market::{Market, MarketState};
use crate::domain::position::Position;
use crate::domain::trade::{MarketId, PriceQuote};
use crate::ports::{Clock, Commit, IdentityProvider, MarketRepository, VoteStore};

/// Read-only summary of a market's economics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
  pub market_id: MarketId,
  pub state: MarketState,
  pub paused: bool,
  pub q_yes: Fixed,
  pub q_no: Fixed,
  pub prices: PriceQuote,
  pub total_volume: Fixed,
  pub trade_count: u64,
  pub net_collected: Fixed,
  pub fees: FeeBreakdown,
  pub worst_case_loss: Fixed,
  pub max_loss: Fixed,
}

/// The prediction-market engine.
pub struct MarketEngine<R: MarketRepository, V: VoteStore> {
  pub(super) repo: Arc<R>,
  pub(super) votes: Arc<V>,
  pub(super) identity: Arc<dyn IdentityProvider>,
  pub(super) clock: Arc<dyn Clock>,
  pub(super) config: Arc<watch::Sender<EngineConfig>>,
  pub(super) locks: MarketLocks,
  halted: RwLock<HashSet<MarketId>>,
  events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl<R: MarketRepository, V: VoteStore> MarketEngine<R, V> {
  /// Create a new engine over the given ports.
  pub fn new(
    repo: Arc<R>,
    votes: Arc<V>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    config: Arc<watch::Sender<EngineConfig>>,
  ) -> Self {
    Self {
      repo,
      votes,
      identity,
      clock,
      config,
      locks: MarketLocks::default(),
      halted: RwLock::new(HashSet::new()),
      events: None,
    }
  }

  /// Route committed events to `tx`.
  #[must_use]
  pub fn with_events(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
    self.events = Some(tx);
    self
  }

  /// Snapshot of the current configuration record.
  pub fn config(&self) -> EngineConfig {
    self.config.borrow().clone()
  }

  /// New receiver for configuration updates.
  pub fn subscribe_config(&self) -> watch::Receiver<EngineConfig> {
    self.config.subscribe()
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  pub fn repository(&self) -> &Arc<R> {
    &self.repo
  }

  pub fn votes(&self) -> &Arc<V> {
    &self.votes
  }

  // ── Queries ──

  /// Load a market without mutation checks.
  pub async fn market(&self, market_id: &str) -> Result<Market, MarketError> {
    self
      .repo
      .load_market(market_id)
      .await?
      .ok_or_else(|| MarketError::MarketNotFound(market_id.to_string()))
  }

  pub async fn markets(&self) -> Result<Vec<Market>, MarketError> {
    Ok(self.repo.list_markets().await?)
  }

  pub async fn prices(&self, market_id: &str) -> Result<PriceQuote, MarketError> {
    self.market(market_id).await?.prices()
  }

  pub async fn position(&self, market_id: &str, trader: &str) -> Result<Position, MarketError> {
    self
      .repo
      .load_position(market_id, trader)
      .await?
      .ok_or_else(|| MarketError::PositionNotFound {
        market_id: market_id.to_string(),
        trader: trader.to_string(),
      })
  }

  pub async fn positions(&self, market_id: &str) -> Result<Vec<Position>, MarketError> {
    Ok(self.repo.positions_for_market(market_id).await?)
  }

  pub async fn stats(&self, market_id: &str) -> Result<MarketStats, MarketError> {
    let market = self.market(market_id).await?;
    Ok(MarketStats {
      market_id: market.id.clone(),
      state: market.state(),
      paused: market.is_paused(),
      q_yes: market.q_yes(),
      q_no: market.q_no(),
      prices: market.prices()?,
      total_volume: market.total_volume(),
      trade_count: market.trade_count(),
      net_collected: market.net_collected(),
      fees: *market.fees(),
      worst_case_loss: market.worst_case_loss()?,
      max_loss: market.model().max_loss()?,
    })
  }

  // ── Halts ──

  pub fn is_halted(&self, market_id: &str) -> bool {
    self
      .halted
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(market_id)
  }

  pub fn halted_markets(&self) -> Vec<MarketId> {
    let mut ids: Vec<MarketId> = self
      .halted
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect();
    ids.sort();
    ids
  }

  pub(super) fn clear_halt(&self, market_id: &str) -> bool {
    self
      .halted
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(market_id)
  }

  /// Halts the market on an invariant violation and passes the error through.
  pub(super) fn halt_on_violation(&self, err: MarketError) -> MarketError {
    if let MarketError::InvariantViolation { market_id, detail } = &err {
      self
        .halted
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(market_id.clone());
      error!(
        critical = true,
        market_id = %market_id,
        detail = %detail,
        "Invariant violated: market halted pending operator review"
      );
      self.emit(EngineEvent::InvariantViolation {
        market_id: market_id.clone(),
        detail: detail.clone(),
        at: self.clock.now(),
      });
    }
    err
  }

  // ── Mutation helpers ──

  /// Load a market for mutation: must exist, not be halted, and pass its
  /// invariants as stored.
  pub(super) async fn load_for_update(&self, market_id: &str) -> Result<Market, MarketError> {
    if self.is_halted(market_id) {
      return Err(MarketError::MarketHalted(market_id.to_string()));
    }
    let market = self.market(market_id).await?;
    market
      .check_invariants()
      .map_err(|err| self.halt_on_violation(err))?;
    Ok(market)
  }

  /// Check invariants, bump versions and commit atomically.
  pub(super) async fn persist(
    &self,
    market: &mut Market,
    positions: &mut [Position],
  ) -> Result<(), MarketError> {
    market
      .check_invariants()
      .map_err(|err| self.halt_on_violation(err))?;

    market.bump_version();
    for position in positions.iter_mut() {
      position.bump_version();
    }
    let commit = Commit {
      market: Some(market.clone()),
      positions: positions.to_vec(),
    };
    self.repo.commit(commit).await?;
    Ok(())
  }

  /// Publish an event; a closed channel is logged and ignored.
  pub(super) fn emit(&self, event: EngineEvent) {
    if let Some(tx) = &self.events {
      if tx.send(event).is_err() {
        warn!("Event channel closed: event dropped");
      }
    }
  }

  pub(super) fn emit_transition(&self, market_id: &str, from: MarketState, to: MarketState) {
    if from != to {
      self.emit(EngineEvent::StateChanged {
        market_id: market_id.to_string(),
        from,
        to,
        at: self.clock.now(),
      });
    }
  }

  pub(super) fn require_admin(&self, config: &EngineConfig, actor: &str, action: &'static str) -> Result<(), MarketError> {
    if config.roles.is_admin(actor) {
      Ok(())
    } else {
      Err(MarketError::Unauthorized {
        actor: actor.to_string(),
        action,
      })
    }
  }
}

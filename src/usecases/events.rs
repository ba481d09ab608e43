//! Engine Events - Structured Audit Stream
//!
//! Every committed mutation emits one `EngineEvent` on an unbounded mpsc
//! channel. The adapters side turns the stream into the hash-chained
//! audit log and Prometheus metrics; the engine itself never waits on
//! either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fixed_point::Fixed;
use crate::domain::market::MarketState;
use crate::domain::trade::{MarketId, Outcome, Side, TradeKind, TraderId};
use crate::domain::vote::{Tally, Verdict, VotePhase};

/// A committed engine action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
  MarketCreated {
    market_id: MarketId,
    creator: TraderId,
    liquidity: Fixed,
    at: DateTime<Utc>,
  },
  StateChanged {
    market_id: MarketId,
    from: MarketState,
    to: MarketState,
    at: DateTime<Utc>,
  },
  TradeExecuted {
    market_id: MarketId,
    trader: TraderId,
    kind: TradeKind,
    side: Side,
    shares: Fixed,
    /// Curve cost (buy) or gross curve proceeds (sell).
    amount: Fixed,
    fees: Fixed,
    price_yes: Fixed,
    at: DateTime<Utc>,
  },
  VoteRecorded {
    market_id: MarketId,
    voter: TraderId,
    phase: VotePhase,
    round: u32,
    sequence: u64,
    at: DateTime<Utc>,
  },
  TallyComputed {
    market_id: MarketId,
    tally: Tally,
    verdict: Verdict,
    at: DateTime<Utc>,
  },
  ResolutionProposed {
    market_id: MarketId,
    resolver: TraderId,
    outcome: Outcome,
    at: DateTime<Utc>,
  },
  Claimed {
    market_id: MarketId,
    trader: TraderId,
    payout: Fixed,
    at: DateTime<Utc>,
  },
  LiquidityWithdrawn {
    market_id: MarketId,
    creator: TraderId,
    total: Fixed,
    at: DateTime<Utc>,
  },
  PauseChanged {
    /// `None` for the global switch.
    market_id: Option<MarketId>,
    paused: bool,
    at: DateTime<Utc>,
  },
  ConfigUpdated {
    version: u64,
    actor: TraderId,
    at: DateTime<Utc>,
  },
  InvariantViolation {
    market_id: MarketId,
    detail: String,
    at: DateTime<Utc>,
  },
}

impl EngineEvent {
  /// Short event name, used as a metrics label.
  pub const fn kind(&self) -> &'static str {
    match self {
      Self::MarketCreated { .. } => "market_created",
      Self::StateChanged { .. } => "state_changed",
      Self::TradeExecuted { .. } => "trade_executed",
      Self::VoteRecorded { .. } => "vote_recorded",
      Self::TallyComputed { .. } => "tally_computed",
      Self::ResolutionProposed { .. } => "resolution_proposed",
      Self::Claimed { .. } => "claimed",
      Self::LiquidityWithdrawn { .. } => "liquidity_withdrawn",
      Self::PauseChanged { .. } => "pause_changed",
      Self::ConfigUpdated { .. } => "config_updated",
      Self::InvariantViolation { .. } => "invariant_violation",
    }
  }

  /// Market the event belongs to, if any.
  pub fn market_id(&self) -> Option<&str> {
    match self {
      Self::MarketCreated { market_id, .. }
      | Self::StateChanged { market_id, .. }
      | Self::TradeExecuted { market_id, .. }
      | Self::VoteRecorded { market_id, .. }
      | Self::TallyComputed { market_id, .. }
      | Self::ResolutionProposed { market_id, .. }
      | Self::Claimed { market_id, .. }
      | Self::LiquidityWithdrawn { market_id, .. }
      | Self::InvariantViolation { market_id, .. } => Some(market_id),
      Self::PauseChanged { market_id, .. } => market_id.as_deref(),
      Self::ConfigUpdated { .. } => None,
    }
  }
}

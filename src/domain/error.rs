//! Error taxonomy for the engine.
//!
//! Three layers:
//! - [`ArithmeticError`]: failures of the fixed-point kernel
//! - [`StoreError`]: failures reported by repository/vote-store adapters
//! - [`MarketError`]: everything an engine operation can reject with
//!
//! All variants are typed; callers match on them instead of parsing
//! messages.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::fixed_point::Fixed;
use super::market::MarketState;
use super::trade::{MarketId, Side, TraderId};
use super::vote::VotePhase;

/// Fixed-point kernel failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("{operation}: argument outside operating domain")]
    OutOfDomain { operation: &'static str },
    #[error("solver did not converge within {iterations} iterations")]
    NoConvergence { iterations: u32 },
}

/// Failures reported by storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed; nothing was written.
    #[error("version conflict on {entity}: expected {expected}, found {found}")]
    VersionConflict {
        entity: String,
        expected: u64,
        found: u64,
    },

    /// The vote store already holds a vote for this (market, voter, phase, round).
    #[error("duplicate {phase} vote from {voter} on market {market_id}")]
    DuplicateVote {
        market_id: MarketId,
        voter: TraderId,
        phase: VotePhase,
    },

    #[error("storage backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Rejection reasons for engine operations.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: MarketState, to: MarketState },

    #[error("{operation} is not allowed while market is {state}")]
    InvalidState {
        state: MarketState,
        operation: &'static str,
    },

    #[error("slippage exceeded: limit {limit}, actual {actual}")]
    SlippageExceeded { limit: Fixed, actual: Fixed },

    #[error("duplicate {phase} vote from {voter}")]
    DuplicateVote { voter: TraderId, phase: VotePhase },

    #[error("quorum not met: {votes} of {quorum} required votes")]
    QuorumNotMet { votes: u64, quorum: u64 },

    #[error("position already claimed")]
    AlreadyClaimed,

    #[error("{actor} is not authorized to {action}")]
    Unauthorized { actor: String, action: &'static str },

    #[error("selling {attempted} {side} shares would cross the share floor {floor}")]
    MarketFloorViolation {
        side: Side,
        floor: Fixed,
        attempted: Fixed,
    },

    #[error("trading is paused")]
    MarketPaused,

    #[error("insufficient shares: held {held}, requested {requested}")]
    InsufficientShares { held: Fixed, requested: Fixed },

    #[error("vote attribution from {voter} could not be verified")]
    InvalidSignature { voter: TraderId },

    #[error("dispute window closed at {closed_at}")]
    DisputeWindowClosed { closed_at: DateTime<Utc> },

    #[error("dispute window open until {closes_at}")]
    DisputeWindowOpen { closes_at: DateTime<Utc> },

    #[error("resolution was already disputed")]
    AlreadyDisputed,

    #[error("{trader} holds no position in this market")]
    NotHolder { trader: TraderId },

    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("market {0} already exists")]
    MarketExists(MarketId),

    #[error("no position for {trader} in market {market_id}")]
    PositionNotFound {
        market_id: MarketId,
        trader: TraderId,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invariant violated on market {market_id}: {detail}")]
    InvariantViolation {
        market_id: MarketId,
        detail: String,
    },

    #[error("market {0} is halted pending operator review")]
    MarketHalted(MarketId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateVote { voter, phase, .. } => Self::DuplicateVote { voter, phase },
            other => Self::Store(other),
        }
    }
}

impl MarketError {
    /// `true` for rejections caused by the caller's request rather than
    /// by engine or storage faults.
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::InvariantViolation { .. } | Self::MarketHalted(_)
        )
    }
}

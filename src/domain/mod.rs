//! Domain layer - Core market logic and models.
//!
//! Pure, synchronous logic for the prediction-market engine: the
//! fixed-point kernel, LMSR pricing, the market state machine, positions,
//! governance tallies and settlement math. Nothing in here performs I/O
//! (hexagonal architecture inner ring); all types are serializable and
//! testable in isolation.

pub mod error;
pub mod fees;
pub mod fixed_point;
pub mod lmsr;
pub mod market;
pub mod position;
pub mod settlement;
pub mod trade;
pub mod vote;

// Re-export core types for convenience
pub use error::{ArithmeticError, MarketError, StoreError};
pub use fees::{FeeBreakdown, FeeSchedule};
pub use fixed_point::Fixed;
pub use lmsr::LmsrModel;
pub use market::{Market, MarketParams, MarketState, Resolution};
pub use position::Position;
pub use settlement::SettlementSnapshot;
pub use trade::{
    BuyQuote, BuyReceipt, ClaimReceipt, ContentHash, LiquidityWithdrawal, MarketId, Outcome,
    PriceQuote, SellReceipt, Side, TradeKind, TraderId,
};
pub use vote::{Ballot, PhaseRule, Tally, Verdict, VoteChoice, VotePhase, VoteRecord};

//! Vote Store Port - Append-Only Governance Log
//!
//! Votes are high-volume, low-value records kept off the market ledger.
//! The store assigns a monotonic sequence number on append and rejects a
//! second vote for the same (market, voter, phase, round). The aggregator
//! does not rely on that rejection: it dedups again while tallying.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::vote::{VotePhase, VoteRecord};

#[async_trait]
pub trait VoteStore: Send + Sync + 'static {
  /// Appends a vote and returns it with its assigned sequence number.
  ///
  /// Fails with `StoreError::DuplicateVote` if the voter already voted in
  /// this (market, phase, round).
  async fn append(&self, vote: VoteRecord) -> Result<VoteRecord, StoreError>;

  /// All votes recorded for one market, phase and round.
  async fn votes_for(
    &self,
    market_id: &str,
    phase: VotePhase,
    round: u32,
  ) -> Result<Vec<VoteRecord>, StoreError>;

  /// Check if the store is reachable.
  async fn is_healthy(&self) -> bool;
}

//! Repository Port - Market and Position Persistence
//!
//! Records are versioned: a committed record must carry
//! `stored_version + 1` (or `1` for a new record). A commit touching a
//! market and several positions is applied atomically; if any version
//! check fails nothing is written and `StoreError::VersionConflict` is
//! returned.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::market::Market;
use crate::domain::position::Position;

/// A set of records written together.
#[derive(Debug, Clone, Default)]
pub struct Commit {
  /// Updated market record, if any.
  pub market: Option<Market>,
  /// Updated position records.
  pub positions: Vec<Position>,
}

impl Commit {
  /// Commit of a single market record.
  pub fn market(market: Market) -> Self {
    Self {
      market: Some(market),
      positions: Vec::new(),
    }
  }

  /// Adds a position record to the commit.
  #[must_use]
  pub fn with_position(mut self, position: Position) -> Self {
    self.positions.push(position);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.market.is_none() && self.positions.is_empty()
  }
}

/// Trait for market/position storage providers.
#[async_trait]
pub trait MarketRepository: Send + Sync + 'static {
  /// Load one market.
  async fn load_market(&self, market_id: &str) -> Result<Option<Market>, StoreError>;

  /// Load every market (scheduler sweeps, snapshots).
  async fn list_markets(&self) -> Result<Vec<Market>, StoreError>;

  /// Load one trader's position in a market.
  async fn load_position(
    &self,
    market_id: &str,
    trader: &str,
  ) -> Result<Option<Position>, StoreError>;

  /// Load every position in a market.
  async fn positions_for_market(&self, market_id: &str) -> Result<Vec<Position>, StoreError>;

  /// Atomically apply a versioned commit.
  async fn commit(&self, commit: Commit) -> Result<(), StoreError>;

  /// Check if the repository is healthy.
  async fn is_healthy(&self) -> bool;
}

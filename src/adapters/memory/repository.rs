//! In-Memory Market Repository - Versioned Records Behind One Lock
//!
//! Implements the `MarketRepository` port over two maps guarded by a
//! single `RwLock`. A commit validates every record's version first and
//! only then writes, so a failed commit leaves both maps untouched.
//! Durability comes from periodic snapshots (see `persistence::snapshot`).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::error::StoreError;
use crate::domain::market::Market;
use crate::domain::position::Position;
use crate::domain::trade::{MarketId, TraderId};
use crate::ports::{Commit, MarketRepository};

#[derive(Debug, Default)]
struct Records {
    markets: HashMap<MarketId, Market>,
    /// Keyed by (market, trader); ordered so listings are stable.
    positions: BTreeMap<(MarketId, TraderId), Position>,
}

/// Process-local market and position storage.
#[derive(Debug, Default)]
pub struct InMemoryMarketRepository {
    records: RwLock<Records>,
}

impl InMemoryMarketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, markets sorted by id.
    pub async fn dump(&self) -> (Vec<Market>, Vec<Position>) {
        let records = self.records.read().await;
        let mut markets: Vec<Market> = records.markets.values().cloned().collect();
        markets.sort_by(|a, b| a.id.cmp(&b.id));
        let positions = records.positions.values().cloned().collect();
        (markets, positions)
    }

    /// Replace all records with a previously dumped set. Versions are kept.
    pub async fn restore(&self, markets: Vec<Market>, positions: Vec<Position>) {
        let mut records = self.records.write().await;
        records.markets = markets.into_iter().map(|m| (m.id.clone(), m)).collect();
        records.positions = positions
            .into_iter()
            .map(|p| ((p.market_id.clone(), p.trader.clone()), p))
            .collect();
        info!(
            markets = records.markets.len(),
            positions = records.positions.len(),
            "Repository restored"
        );
    }
}

fn check_version(entity: String, stored: Option<u64>, incoming: u64) -> Result<(), StoreError> {
    let expected = stored.map_or(1, |v| v + 1);
    if incoming == expected {
        Ok(())
    } else {
        Err(StoreError::VersionConflict {
            entity,
            expected,
            found: incoming,
        })
    }
}

#[async_trait]
impl MarketRepository for InMemoryMarketRepository {
    async fn load_market(&self, market_id: &str) -> Result<Option<Market>, StoreError> {
        Ok(self.records.read().await.markets.get(market_id).cloned())
    }

    async fn list_markets(&self) -> Result<Vec<Market>, StoreError> {
        let records = self.records.read().await;
        let mut markets: Vec<Market> = records.markets.values().cloned().collect();
        markets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(markets)
    }

    async fn load_position(
        &self,
        market_id: &str,
        trader: &str,
    ) -> Result<Option<Position>, StoreError> {
        let key = (market_id.to_string(), trader.to_string());
        Ok(self.records.read().await.positions.get(&key).cloned())
    }

    async fn positions_for_market(&self, market_id: &str) -> Result<Vec<Position>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .positions
            .values()
            .filter(|p| p.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        if commit.is_empty() {
            return Ok(());
        }
        let mut records = self.records.write().await;

        // Validate everything before touching anything.
        if let Some(market) = &commit.market {
            let stored = records.markets.get(&market.id).map(Market::version);
            check_version(format!("market {}", market.id), stored, market.version())?;
        }
        for position in &commit.positions {
            let key = (position.market_id.clone(), position.trader.clone());
            let stored = records.positions.get(&key).map(Position::version);
            check_version(
                format!("position {}/{}", position.market_id, position.trader),
                stored,
                position.version(),
            )?;
        }

        let touched = commit.positions.len();
        if let Some(market) = commit.market {
            records.markets.insert(market.id.clone(), market);
        }
        for position in commit.positions {
            records
                .positions
                .insert((position.market_id.clone(), position.trader.clone()), position);
        }
        debug!(positions = touched, "Commit applied");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

//! Per-market serialization.
//!
//! Trades, aggregations, resolutions and claims on one market run one at
//! a time; different markets proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::trade::MarketId;

#[derive(Debug, Default)]
pub struct MarketLocks {
  inner: Mutex<HashMap<MarketId, Arc<AsyncMutex<()>>>>,
}

impl MarketLocks {
  /// Waits for exclusive access to `market_id`.
  pub async fn acquire(&self, market_id: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(map.entry(market_id.to_string()).or_default())
    };
    lock.lock_owned().await
  }
}

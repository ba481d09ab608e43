//! Snapshot Store - Atomic JSON Engine State Persistence
//!
//! Saves the full record set (markets, positions, votes) to
//! `snapshot.json` using atomic writes (write to tmp file, then rename).
//! The file is always either the old or the new snapshot, never a
//! partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument};

use crate::adapters::memory::{InMemoryMarketRepository, InMemoryVoteStore};
use crate::domain::market::Market;
use crate::domain::position::Position;
use crate::domain::vote::VoteRecord;

/// Point-in-time copy of every engine record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Config record version in force when the snapshot was taken.
    pub config_version: u64,
    pub markets: Vec<Market>,
    pub positions: Vec<Position>,
    pub votes: Vec<VoteRecord>,
}

impl EngineSnapshot {
    /// Copy the in-memory stores.
    pub async fn capture(
        repo: &InMemoryMarketRepository,
        votes: &InMemoryVoteStore,
        config_version: u64,
    ) -> Self {
        let (markets, positions) = repo.dump().await;
        Self {
            taken_at: Utc::now(),
            config_version,
            markets,
            positions,
            votes: votes.dump().await,
        }
    }

    /// Load this snapshot into (empty) in-memory stores.
    pub async fn restore_into(self, repo: &InMemoryMarketRepository, votes: &InMemoryVoteStore) {
        repo.restore(self.markets, self.positions).await;
        votes.restore(self.votes).await;
    }
}

/// Atomic JSON snapshot store for crash recovery.
pub struct SnapshotStore {
    snapshot_path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotStore {
    /// Create a new snapshot store in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            snapshot_path: dir.join("snapshot.json"),
            tmp_path: dir.join("snapshot.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;
        fs::rename(&self.tmp_path, &self.snapshot_path)
            .await
            .context("Failed to rename snapshot file")?;

        info!(
            path = %self.snapshot_path.display(),
            markets = snapshot.markets.len(),
            positions = snapshot.positions.len(),
            votes = snapshot.votes.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load the most recent snapshot.
    ///
    /// Returns `None` if no snapshot exists (first startup).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<EngineSnapshot>> {
        if !self.snapshot_path.exists() {
            info!("No snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.snapshot_path)
            .await
            .context("Failed to read snapshot file")?;
        let snapshot: EngineSnapshot =
            serde_json::from_str(&json).context("Failed to parse snapshot JSON")?;

        info!(
            taken_at = %snapshot.taken_at,
            markets = snapshot.markets.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Check if the snapshot file, when present, is readable.
    pub async fn is_healthy(&self) -> bool {
        if !self.snapshot_path.exists() {
            return true;
        }
        fs::metadata(&self.snapshot_path).await.is_ok()
    }
}

//! Config Hot-Reload - Watch config.toml for Changes Every 60s
//!
//! Periodically re-reads config.toml and compares with the current
//! file contents. If changes are detected, the file is re-validated and
//! a new [`EngineConfig`] record (version + 1) is published through the
//! shared `tokio::sync::watch` channel. Engine operations already in
//! flight keep the snapshot they started with.
//!
//! A global pause set at runtime survives a reload: the file can switch
//! the pause on, but only an admin can switch it off.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::EngineConfig;

/// Interval between config file checks.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Watches config.toml for changes and publishes new engine records.
///
/// Polls the config file (not a filesystem watcher, which has
/// portability issues across Linux/macOS/Docker volumes).
/// Compares a hash of the file contents to detect meaningful changes.
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// Shared publisher of engine records (also used by admin updates).
    config_tx: Arc<watch::Sender<EngineConfig>>,
    /// Last known file hash (for diff detection).
    last_hash: Option<[u8; 32]>,
}

impl ConfigWatcher {
    /// Create a new config watcher publishing into `config_tx`.
    pub fn new(config_path: &str, config_tx: Arc<watch::Sender<EngineConfig>>) -> Self {
        Self {
            config_path: config_path.to_string(),
            config_tx,
            last_hash: None,
        }
    }

    /// Run the config watcher loop until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            path = %self.config_path,
            "Config watcher started: checking every 60s"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return Ok(());
                }
                () = tokio::time::sleep(POLL_INTERVAL) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Check if config has changed and reload if so.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        info!("Config change detected, reloading...");

        // version and pause are taken from the live record inside the write
        let reloaded = super::loader::load_config(&self.config_path)
            .and_then(|app| EngineConfig::from_app(&app, 0).map_err(anyhow::Error::from));

        match reloaded {
            Ok(mut record) => {
                self.last_hash = new_hash;
                let mut version = 0;
                self.config_tx.send_modify(|current| {
                    record.version = current.version + 1;
                    record.global_pause |= current.global_pause;
                    version = record.version;
                    *current = record;
                });
                info!(version, "Config reloaded successfully");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to reload config: keeping current"
                );
                false
            }
        }
    }

    /// SHA-256 of the config file contents.
    async fn compute_hash(&self) -> Option<[u8; 32]> {
        let content = tokio::fs::read(&self.config_path).await.ok()?;
        Some(hmac_sha256::Hash::hash(&content))
    }
}

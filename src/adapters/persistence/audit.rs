//! Audit Log - Append-only, Hash-Chained JSONL Event Records
//!
//! Persists every engine event to `audit.jsonl`. Each line is a complete
//! JSON record carrying the SHA-256 of the previous record, so truncation
//! or an edited line is detected by [`AuditLog::verify`]. Reopening an
//! existing log resumes the chain from its last line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::domain::trade::ContentHash;
use crate::usecases::EngineEvent;

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    /// Hex SHA-256 of the previous entry (all zeros for the first).
    pub prev_hash: String,
    /// Hex SHA-256 over `sequence | prev_hash | event JSON`.
    pub hash: String,
    pub event: EngineEvent,
}

impl AuditEntry {
    fn chain_hash(sequence: u64, prev_hash: &str, event: &EngineEvent) -> Result<String> {
        let body = serde_json::to_string(event).context("Failed to serialize audit event")?;
        let preimage = format!("{sequence}|{prev_hash}|{body}");
        Ok(ContentHash::of(preimage.as_bytes()).to_string())
    }
}

#[derive(Debug)]
struct ChainHead {
    sequence: u64,
    hash: String,
}

/// Hash-chained audit log.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    head: Mutex<ChainHead>,
}

impl AuditLog {
    /// Open (or create) `audit.jsonl` in `data_dir`.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;
        let path = dir.join("audit.jsonl");

        let head = match Self::read_entries(&path).await?.last() {
            Some(last) => ChainHead {
                sequence: last.sequence,
                hash: last.hash.clone(),
            },
            None => ChainHead {
                sequence: 0,
                hash: ContentHash::default().to_string(),
            },
        };
        info!(path = %path.display(), sequence = head.sequence, "Audit log opened");

        Ok(Self {
            path,
            head: Mutex::new(head),
        })
    }

    /// Append one event and extend the chain.
    #[instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn append(&self, event: EngineEvent) -> Result<AuditEntry> {
        let mut head = self.head.lock().await;
        let sequence = head.sequence + 1;
        let hash = AuditEntry::chain_hash(sequence, &head.hash, &event)?;
        let entry = AuditEntry {
            sequence,
            recorded_at: Utc::now(),
            prev_hash: head.hash.clone(),
            hash,
            event,
        };

        let mut json = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("Failed to open audit log")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write audit entry")?;
        file.flush().await.context("Failed to flush audit log")?;

        head.sequence = sequence;
        head.hash.clone_from(&entry.hash);
        Ok(entry)
    }

    /// Re-walk the chain. Returns the number of verified entries.
    pub async fn verify(&self) -> Result<u64> {
        let entries = Self::read_entries(&self.path).await?;
        let mut prev = ContentHash::default().to_string();
        for (index, entry) in entries.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            anyhow::ensure!(
                entry.sequence == expected_sequence,
                "audit gap: expected sequence {expected_sequence}, found {}",
                entry.sequence
            );
            anyhow::ensure!(
                entry.prev_hash == prev,
                "audit chain broken at sequence {}",
                entry.sequence
            );
            let recomputed = AuditEntry::chain_hash(entry.sequence, &entry.prev_hash, &entry.event)?;
            anyhow::ensure!(
                recomputed == entry.hash,
                "audit entry {} was modified",
                entry.sequence
            );
            prev.clone_from(&entry.hash);
        }
        Ok(entries.len() as u64)
    }

    /// All entries in file order.
    pub async fn entries(&self) -> Result<Vec<AuditEntry>> {
        Self::read_entries(&self.path).await
    }

    async fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read audit log")?;
        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(line)
                .with_context(|| format!("Malformed audit entry on line {}", line_no + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Check if the data directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let Some(dir) = self.path.parent() else {
            return false;
        };
        let probe = dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}

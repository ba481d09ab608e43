//! Persistence Adapters - JSON File Storage
//!
//! Atomic JSON snapshots of the engine's records plus an append-only,
//! hash-chained JSONL audit log of every engine event.
//! No database dependency; state survives restarts through the snapshot.

pub mod audit;
pub mod snapshot;

pub use audit::{AuditEntry, AuditLog};
pub use snapshot::{EngineSnapshot, SnapshotStore};

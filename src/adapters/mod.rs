//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure (memory, files, HTTP). Each sub-module groups adapters
//! by infrastructure concern.
//!
//! Adapter categories:
//! - `memory`: in-process repository, vote store and voter keys
//! - `clock`: system and manual clocks
//! - `metrics`: Prometheus export, health checks, event fan-out
//! - `persistence`: JSON snapshots and the hash-chained audit log

pub mod clock;
pub mod memory;
pub mod metrics;
pub mod persistence;

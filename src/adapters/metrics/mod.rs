//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics export and health check endpoints (/live, /ready,
//! /status) via axum 0.7, plus the task that fans the engine event
//! stream out to the audit log and the metrics registry.

pub mod health;
pub mod prometheus;
pub mod sink;

pub use health::{HealthServer, HealthState};
pub use prometheus::EngineMetrics;
pub use sink::EventSink;

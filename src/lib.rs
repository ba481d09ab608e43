//! Prediction Market Engine - Library Root
//!
//! LMSR binary prediction markets: fixed-point pricing, a governed
//! lifecycle state machine, signed vote aggregation and settlement.
//! Re-exports all modules for the binary, integration tests and
//! benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;

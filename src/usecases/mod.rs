//! Use Cases Layer - Engine Operations
//!
//! Orchestrates domain logic with port interfaces. `MarketEngine` owns the
//! ports and the configuration channel; its operations are split by
//! concern across the sibling modules.
//!
//! Use cases:
//! - `trading`: buy/sell against the LMSR curve, quotes
//! - `governance`: market creation, votes, aggregation, resolution, disputes
//! - `settlement`: claims and creator liquidity withdrawal
//! - `admin`: pauses, cancellation, invariant halts, rule updates
//! - `aggregator`: periodic lifecycle sweep

pub mod admin;
pub mod aggregator;
pub mod engine;
pub mod events;
pub mod governance;
pub mod locks;
pub mod settlement;
pub mod trading;

pub use aggregator::{AggregationScheduler, SweepReport};
pub use engine::{MarketEngine, MarketStats};
pub use events::EngineEvent;
pub use governance::AggregationOutcome;

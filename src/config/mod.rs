//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. Market rules,
//! fee rates, vote thresholds and roles are externalized here; the domain
//! layer receives them as an [`EngineConfig`] snapshot per operation.
//!
//! Monetary values are written as decimal strings (`"0.1"`) so they reach
//! the fixed-point kernel exactly.

pub mod engine;
pub mod hot_reload;
pub mod loader;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

pub use engine::{EngineConfig, Roles};

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and scheduling.
  pub service: ServiceConfig,
  /// Market creation and trading rules.
  #[serde(default)]
  pub market: MarketRulesConfig,
  /// Trading fee rates.
  #[serde(default)]
  pub fees: FeeConfig,
  /// Vote thresholds and quorums.
  #[serde(default)]
  pub governance: GovernanceConfig,
  /// Privileged participants.
  #[serde(default)]
  pub roles: RolesConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Vote aggregation / lifecycle sweep cadence (seconds).
  #[serde(default = "default_aggregation_interval")]
  pub aggregation_interval_seconds: u64,
  /// JSON file mapping voter ids to base64 attribution keys.
  #[serde(default)]
  pub voter_keys_file: Option<String>,
}

/// Market creation and trading rules.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRulesConfig {
  /// Quantity each side starts at and can never drop below.
  #[serde(default = "default_share_floor")]
  pub share_floor: Decimal,
  /// Smallest liquidity parameter `b` accepted at creation.
  #[serde(default = "default_min_liquidity")]
  pub min_liquidity: Decimal,
  /// Largest liquidity parameter `b` accepted at creation.
  #[serde(default = "default_max_liquidity")]
  pub max_liquidity: Decimal,
  /// Smallest buy spend or sell size accepted.
  #[serde(default = "default_min_trade_amount")]
  pub min_trade_amount: Decimal,
  /// Dispute window after a resolution proposal (seconds, default 48h).
  #[serde(default = "default_dispute_window")]
  pub dispute_window_seconds: u64,
  /// Voting period once a dispute is opened (seconds, default 3 days).
  #[serde(default = "default_dispute_voting_period")]
  pub dispute_voting_period_seconds: u64,
  /// Minimum time after activation before an unexpired market may be resolved.
  #[serde(default)]
  pub min_resolution_delay_seconds: u64,
  /// Halt all trading (votes and resolution continue).
  #[serde(default)]
  pub global_pause: bool,
}

/// Trading fee configuration, in basis points.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
  #[serde(default = "default_protocol_bps")]
  pub protocol_bps: u16,
  #[serde(default = "default_creator_bps")]
  pub creator_bps: u16,
  #[serde(default = "default_liquidity_bps")]
  pub liquidity_bps: u16,
}

/// Vote thresholds and quorums per phase.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
  /// Approval share needed to approve a proposal (default 70%).
  #[serde(default = "default_proposal_threshold")]
  pub proposal_threshold_bps: u16,
  /// Minimum counted votes on a proposal.
  #[serde(default = "default_proposal_quorum")]
  pub proposal_quorum: u64,
  /// Agree share needed to overturn a resolution (default 60%).
  #[serde(default = "default_dispute_threshold")]
  pub dispute_threshold_bps: u16,
  /// Minimum counted votes on a dispute.
  #[serde(default = "default_dispute_quorum")]
  pub dispute_quorum: u64,
}

/// Role assignments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolesConfig {
  /// May pause, cancel, activate and update configuration.
  #[serde(default)]
  pub admins: Vec<String>,
  /// May propose resolutions.
  #[serde(default)]
  pub resolvers: Vec<String>,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Health/metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for snapshots and the audit log.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// State snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
  /// Write the hash-chained JSONL audit log.
  #[serde(default = "default_true")]
  pub audit_log: bool,
}

impl Default for MarketRulesConfig {
  fn default() -> Self {
    Self {
      share_floor: default_share_floor(),
      min_liquidity: default_min_liquidity(),
      max_liquidity: default_max_liquidity(),
      min_trade_amount: default_min_trade_amount(),
      dispute_window_seconds: default_dispute_window(),
      dispute_voting_period_seconds: default_dispute_voting_period(),
      min_resolution_delay_seconds: 0,
      global_pause: false,
    }
  }
}

impl Default for FeeConfig {
  fn default() -> Self {
    Self {
      protocol_bps: default_protocol_bps(),
      creator_bps: default_creator_bps(),
      liquidity_bps: default_liquidity_bps(),
    }
  }
}

impl Default for GovernanceConfig {
  fn default() -> Self {
    Self {
      proposal_threshold_bps: default_proposal_threshold(),
      proposal_quorum: default_proposal_quorum(),
      dispute_threshold_bps: default_dispute_threshold(),
      dispute_quorum: default_dispute_quorum(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_interval_seconds: default_snapshot_interval(),
      audit_log: true,
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_aggregation_interval() -> u64 {
  300
}

fn default_share_floor() -> Decimal {
  dec!(0.1)
}

fn default_min_liquidity() -> Decimal {
  dec!(100)
}

fn default_max_liquidity() -> Decimal {
  dec!(1000000)
}

fn default_min_trade_amount() -> Decimal {
  dec!(0.01)
}

fn default_dispute_window() -> u64 {
  172_800 // 48 h
}

fn default_dispute_voting_period() -> u64 {
  259_200 // 3 days
}

fn default_protocol_bps() -> u16 {
  300
}

fn default_creator_bps() -> u16 {
  200
}

fn default_liquidity_bps() -> u16 {
  500
}

fn default_proposal_threshold() -> u16 {
  7_000
}

fn default_proposal_quorum() -> u64 {
  10
}

fn default_dispute_threshold() -> u16 {
  6_000
}

fn default_dispute_quorum() -> u64 {
  5
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}

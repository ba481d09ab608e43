//! Engine Configuration Record - Versioned Runtime Rules
//!
//! The validated, fixed-point form of [`AppConfig`] that engine operations
//! read. Every operation takes one snapshot at entry and uses it
//! throughout, so a concurrent reload never changes the rules halfway
//! through a trade. Each published record carries a monotonic version.

use std::collections::BTreeSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::AppConfig;
use crate::domain::error::MarketError;
use crate::domain::fees::FeeSchedule;
use crate::domain::fixed_point::Fixed;
use crate::domain::trade::TraderId;
use crate::domain::vote::PhaseRule;

/// Upper bound on configurable time windows (one year).
const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 3600;

/// Privileged participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
  pub admins: BTreeSet<TraderId>,
  pub resolvers: BTreeSet<TraderId>,
}

impl Roles {
  pub fn is_admin(&self, actor: &str) -> bool {
    self.admins.contains(actor)
  }

  pub fn is_resolver(&self, actor: &str) -> bool {
    self.resolvers.contains(actor)
  }
}

/// Versioned engine rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Monotonic record version.
  pub version: u64,
  pub fees: FeeSchedule,
  /// Proposal phase rule (default 70%, quorum 10).
  pub proposal: PhaseRule,
  /// Dispute phase rule (default 60%, quorum 5).
  pub dispute: PhaseRule,
  pub dispute_window_seconds: u64,
  /// Dispute votes are collected until `opened_at` plus this period.
  pub dispute_voting_period_seconds: u64,
  pub min_resolution_delay_seconds: u64,
  pub share_floor: Fixed,
  pub min_liquidity: Fixed,
  pub max_liquidity: Fixed,
  pub min_trade_amount: Fixed,
  pub global_pause: bool,
  pub roles: Roles,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      version: 1,
      fees: FeeSchedule::default(),
      proposal: PhaseRule {
        threshold_bps: 7_000,
        quorum: 10,
      },
      dispute: PhaseRule {
        threshold_bps: 6_000,
        quorum: 5,
      },
      dispute_window_seconds: 172_800,
      dispute_voting_period_seconds: 259_200,
      min_resolution_delay_seconds: 0,
      share_floor: Fixed::from_raw(100_000_000),
      min_liquidity: Fixed::from_raw(100 * Fixed::ONE.raw()),
      max_liquidity: Fixed::from_raw(1_000_000 * Fixed::ONE.raw()),
      min_trade_amount: Fixed::from_raw(10_000_000),
      global_pause: false,
      roles: Roles::default(),
    }
  }
}

impl EngineConfig {
  /// Builds and validates the runtime record from file configuration.
  pub fn from_app(app: &AppConfig, version: u64) -> Result<Self, MarketError> {
    let config = Self {
      version,
      fees: FeeSchedule {
        protocol_bps: app.fees.protocol_bps,
        creator_bps: app.fees.creator_bps,
        liquidity_bps: app.fees.liquidity_bps,
      },
      proposal: PhaseRule {
        threshold_bps: app.governance.proposal_threshold_bps,
        quorum: app.governance.proposal_quorum,
      },
      dispute: PhaseRule {
        threshold_bps: app.governance.dispute_threshold_bps,
        quorum: app.governance.dispute_quorum,
      },
      dispute_window_seconds: app.market.dispute_window_seconds,
      dispute_voting_period_seconds: app.market.dispute_voting_period_seconds,
      min_resolution_delay_seconds: app.market.min_resolution_delay_seconds,
      share_floor: Fixed::from_decimal(app.market.share_floor)?,
      min_liquidity: Fixed::from_decimal(app.market.min_liquidity)?,
      max_liquidity: Fixed::from_decimal(app.market.max_liquidity)?,
      min_trade_amount: Fixed::from_decimal(app.market.min_trade_amount)?,
      global_pause: app.market.global_pause,
      roles: Roles {
        admins: app.roles.admins.iter().cloned().collect(),
        resolvers: app.roles.resolvers.iter().cloned().collect(),
      },
    };
    config.validate()?;
    Ok(config)
  }

  /// Checks every rule; rejects the record as a whole on the first failure.
  pub fn validate(&self) -> Result<(), MarketError> {
    self.fees.validate()?;
    self.proposal.validate()?;
    self.dispute.validate()?;

    let invalid = |msg: String| Err(MarketError::InvalidParameter(msg));
    if !self.share_floor.is_positive() {
      return invalid(format!("share_floor must be positive, got {}", self.share_floor));
    }
    if !self.min_liquidity.is_positive() {
      return invalid(format!("min_liquidity must be positive, got {}", self.min_liquidity));
    }
    if self.max_liquidity < self.min_liquidity {
      return invalid(format!(
        "max_liquidity {} below min_liquidity {}",
        self.max_liquidity, self.min_liquidity
      ));
    }
    if !self.min_trade_amount.is_positive() {
      return invalid(format!(
        "min_trade_amount must be positive, got {}",
        self.min_trade_amount
      ));
    }
    if self.dispute_window_seconds > MAX_WINDOW_SECONDS {
      return invalid(format!(
        "dispute_window_seconds {} exceeds {MAX_WINDOW_SECONDS}",
        self.dispute_window_seconds
      ));
    }
    if self.dispute_voting_period_seconds == 0 || self.dispute_voting_period_seconds > MAX_WINDOW_SECONDS {
      return invalid(format!(
        "dispute_voting_period_seconds {} outside [1, {MAX_WINDOW_SECONDS}]",
        self.dispute_voting_period_seconds
      ));
    }
    if self.min_resolution_delay_seconds > MAX_WINDOW_SECONDS {
      return invalid(format!(
        "min_resolution_delay_seconds {} exceeds {MAX_WINDOW_SECONDS}",
        self.min_resolution_delay_seconds
      ));
    }
    Ok(())
  }

  pub fn dispute_window(&self) -> Duration {
    seconds(self.dispute_window_seconds)
  }

  pub fn dispute_voting_period(&self) -> Duration {
    seconds(self.dispute_voting_period_seconds)
  }

  pub fn min_resolution_delay(&self) -> Duration {
    seconds(self.min_resolution_delay_seconds)
  }
}

fn seconds(value: u64) -> Duration {
  i64::try_from(value)
    .ok()
    .and_then(Duration::try_seconds)
    .unwrap_or(Duration::MAX)
}

//! Core trading domain types.
//!
//! Identifiers, outcome sides, content hashes and the receipts returned by
//! trades and claims. Everything here is plain data shared by the domain,
//! ports and adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fees::FeeBreakdown;
use super::fixed_point::Fixed;

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Opaque market identifier.
pub type MarketId = String;

/// Opaque participant identifier (trader, voter, resolver, admin).
pub type TraderId = String;

// ────────────────────────────────────────────
// Sides and outcomes
// ────────────────────────────────────────────

/// One of the two outcomes a share can pay out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The opposite outcome.
    pub const fn other(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Resolved result of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
    /// Question was ambiguous or unresolvable: pro-rata refunds.
    Invalid,
}

impl Outcome {
    /// Side whose shares redeem 1:1, `None` for [`Outcome::Invalid`].
    pub const fn winning_side(self) -> Option<Side> {
        match self {
            Self::Yes => Some(Side::Yes),
            Self::No => Some(Side::No),
            Self::Invalid => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
            Self::Invalid => write!(f, "INVALID"),
        }
    }
}

/// 32-byte content hash (question text, resolution evidence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// SHA-256 of arbitrary content.
    pub fn of(content: &[u8]) -> Self {
        Self(hmac_sha256::Hash::hash(content))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────
// Receipts
// ────────────────────────────────────────────

/// Result of an executed buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub market_id: MarketId,
    pub trader: TraderId,
    pub side: Side,
    /// Shares minted to the trader.
    pub shares: Fixed,
    /// Curve cost `C(q') − C(q)`.
    pub curve_cost: Fixed,
    /// Fees charged on top of the curve cost.
    pub fees: FeeBreakdown,
    /// Total debited: curve cost plus fees.
    pub cost_paid: Fixed,
    /// YES price after the trade.
    pub price_yes: Fixed,
    /// NO price after the trade.
    pub price_no: Fixed,
    pub executed_at: DateTime<Utc>,
}

/// Result of an executed sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellReceipt {
    pub market_id: MarketId,
    pub trader: TraderId,
    pub side: Side,
    /// Shares burned from the trader.
    pub shares: Fixed,
    /// Curve proceeds `C(q) − C(q')` before fees.
    pub gross_proceeds: Fixed,
    pub fees: FeeBreakdown,
    /// Credited to the trader: gross proceeds minus fees.
    pub proceeds: Fixed,
    pub price_yes: Fixed,
    pub price_no: Fixed,
    pub executed_at: DateTime<Utc>,
}

/// Preview of a buy without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub side: Side,
    pub shares: Fixed,
    pub curve_cost: Fixed,
    pub fees: FeeBreakdown,
    pub cost_paid: Fixed,
}

/// Current marginal prices of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub yes: Fixed,
    pub no: Fixed,
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub market_id: MarketId,
    pub trader: TraderId,
    pub outcome: Outcome,
    /// Amount credited; zero for losing positions.
    pub payout: Fixed,
    pub claimed_at: DateTime<Utc>,
}

/// Funds returned to the market creator once settlement is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityWithdrawal {
    pub market_id: MarketId,
    pub creator: TraderId,
    /// Initial backing liquidity plus curve surplus after obligations.
    pub liquidity: Fixed,
    /// Accrued liquidity-provider fees.
    pub liquidity_fees: Fixed,
    /// Accrued creator fees.
    pub creator_fees: Fixed,
    pub total: Fixed,
}

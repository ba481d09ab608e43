//! Per-trader holdings in one market.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MarketError;
use super::fixed_point::Fixed;
use super::trade::{MarketId, Side, TraderId};

/// A trader's shares and cash flows in one market.
///
/// `total_invested` and `total_proceeds` track curve amounts only (fees
/// excluded); their difference is the weight used for pro-rata refunds
/// when a market resolves INVALID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub trader: TraderId,
    shares_yes: Fixed,
    shares_no: Fixed,
    /// Curve cost of all buys.
    total_invested: Fixed,
    /// Curve proceeds of all sells.
    total_proceeds: Fixed,
    /// Fees paid on buys and sells.
    fees_paid: Fixed,
    trade_count: u32,
    opened_at: DateTime<Utc>,
    last_trade_at: Option<DateTime<Utc>>,
    claimed: bool,
    claimed_amount: Fixed,
    claimed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Position {
    pub fn new(market_id: MarketId, trader: TraderId, now: DateTime<Utc>) -> Self {
        Self {
            market_id,
            trader,
            shares_yes: Fixed::ZERO,
            shares_no: Fixed::ZERO,
            total_invested: Fixed::ZERO,
            total_proceeds: Fixed::ZERO,
            fees_paid: Fixed::ZERO,
            trade_count: 0,
            opened_at: now,
            last_trade_at: None,
            claimed: false,
            claimed_amount: Fixed::ZERO,
            claimed_at: None,
            version: 0,
        }
    }

    pub const fn shares(&self, side: Side) -> Fixed {
        match side {
            Side::Yes => self.shares_yes,
            Side::No => self.shares_no,
        }
    }

    pub const fn has_shares(&self) -> bool {
        self.shares_yes.is_positive() || self.shares_no.is_positive()
    }

    pub const fn total_invested(&self) -> Fixed {
        self.total_invested
    }

    pub const fn total_proceeds(&self) -> Fixed {
        self.total_proceeds
    }

    pub const fn fees_paid(&self) -> Fixed {
        self.fees_paid
    }

    pub const fn trade_count(&self) -> u32 {
        self.trade_count
    }

    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub const fn last_trade_at(&self) -> Option<DateTime<Utc>> {
        self.last_trade_at
    }

    pub const fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub const fn claimed_amount(&self) -> Fixed {
        self.claimed_amount
    }

    pub const fn claimed_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_at
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    pub const fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Net curve contribution (invested − proceeds), floored at zero.
    pub fn refund_weight(&self) -> Fixed {
        self.total_invested
            .checked_sub(self.total_proceeds)
            .map_or(Fixed::ZERO, |net| net.max(Fixed::ZERO))
    }

    /// Realized result: payout plus sell proceeds minus invested and fees.
    pub fn net_profit(&self) -> Result<Fixed, MarketError> {
        Ok(self
            .claimed_amount
            .checked_add(self.total_proceeds)?
            .checked_sub(self.total_invested)?
            .checked_sub(self.fees_paid)?)
    }

    pub fn apply_buy(
        &mut self,
        side: Side,
        shares: Fixed,
        curve_cost: Fixed,
        fees: Fixed,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        let held = self.shares(side).checked_add(shares)?;
        let invested = self.total_invested.checked_add(curve_cost)?;
        let fees_paid = self.fees_paid.checked_add(fees)?;

        self.set_shares(side, held);
        self.total_invested = invested;
        self.fees_paid = fees_paid;
        self.record_trade(now);
        Ok(())
    }

    pub fn apply_sell(
        &mut self,
        side: Side,
        shares: Fixed,
        gross_proceeds: Fixed,
        fees: Fixed,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        let held = self.shares(side);
        if held < shares {
            return Err(MarketError::InsufficientShares {
                held,
                requested: shares,
            });
        }
        let remaining = held.checked_sub(shares)?;
        let proceeds = self.total_proceeds.checked_add(gross_proceeds)?;
        let fees_paid = self.fees_paid.checked_add(fees)?;

        self.set_shares(side, remaining);
        self.total_proceeds = proceeds;
        self.fees_paid = fees_paid;
        self.record_trade(now);
        Ok(())
    }

    /// Marks the position as paid out. Succeeds at most once.
    pub fn mark_claimed(&mut self, payout: Fixed, now: DateTime<Utc>) -> Result<(), MarketError> {
        if self.claimed {
            return Err(MarketError::AlreadyClaimed);
        }
        self.claimed = true;
        self.claimed_amount = payout;
        self.claimed_at = Some(now);
        Ok(())
    }

    fn set_shares(&mut self, side: Side, shares: Fixed) {
        match side {
            Side::Yes => self.shares_yes = shares,
            Side::No => self.shares_no = shares,
        }
    }

    fn record_trade(&mut self, now: DateTime<Utc>) {
        self.trade_count = self.trade_count.saturating_add(1);
        self.last_trade_at = Some(now);
    }
}

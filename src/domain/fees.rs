//! Trading fee schedule.
//!
//! Fees are charged on top of the curve cost of a buy and deducted from
//! the curve proceeds of a sell. The total fee is `amount · total_bps /
//! 10000`; the protocol and creator slices are taken pro-rata from that
//! total and the liquidity slice receives the remainder, so the three
//! components always add up to the total exactly.

use serde::{Deserialize, Serialize};

use super::error::{ArithmeticError, MarketError};
use super::fixed_point::{BPS_DENOMINATOR, Fixed};

/// Fee rates in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Protocol treasury share (default 300 = 3%).
    pub protocol_bps: u16,
    /// Market creator share (default 200 = 2%).
    pub creator_bps: u16,
    /// Liquidity backer share (default 500 = 5%).
    pub liquidity_bps: u16,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            protocol_bps: 300,
            creator_bps: 200,
            liquidity_bps: 500,
        }
    }
}

/// Fee amounts charged on one trade (or accrued on a market).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub protocol: Fixed,
    pub creator: Fixed,
    pub liquidity: Fixed,
    pub total: Fixed,
}

impl FeeSchedule {
    /// Validated constructor: the combined rate may not exceed 100%.
    pub fn new(protocol_bps: u16, creator_bps: u16, liquidity_bps: u16) -> Result<Self, MarketError> {
        let schedule = Self {
            protocol_bps,
            creator_bps,
            liquidity_bps,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        if self.total_bps() > BPS_DENOMINATOR {
            return Err(MarketError::InvalidParameter(format!(
                "combined fee rate {} bps exceeds {BPS_DENOMINATOR}",
                self.total_bps()
            )));
        }
        Ok(())
    }

    /// Sum of the three rates.
    pub fn total_bps(&self) -> u32 {
        u32::from(self.protocol_bps) + u32::from(self.creator_bps) + u32::from(self.liquidity_bps)
    }

    /// Splits the fee owed on `amount` into its components.
    pub fn split(&self, amount: Fixed) -> Result<FeeBreakdown, ArithmeticError> {
        if amount.is_negative() {
            return Err(ArithmeticError::Underflow);
        }
        let total_bps = self.total_bps();
        if total_bps == 0 {
            return Ok(FeeBreakdown::default());
        }

        let total = amount.mul_bps(total_bps)?;
        let protocol = pro_rata(total, self.protocol_bps, total_bps)?;
        let creator = pro_rata(total, self.creator_bps, total_bps)?;
        let liquidity = total.checked_sub(protocol)?.checked_sub(creator)?;

        Ok(FeeBreakdown {
            protocol,
            creator,
            liquidity,
            total,
        })
    }
}

impl FeeBreakdown {
    /// Adds another breakdown component-wise.
    pub fn accumulate(&self, other: &Self) -> Result<Self, ArithmeticError> {
        Ok(Self {
            protocol: self.protocol.checked_add(other.protocol)?,
            creator: self.creator.checked_add(other.creator)?,
            liquidity: self.liquidity.checked_add(other.liquidity)?,
            total: self.total.checked_add(other.total)?,
        })
    }
}

fn pro_rata(total: Fixed, part_bps: u16, total_bps: u32) -> Result<Fixed, ArithmeticError> {
    let raw = i128::from(total.raw()) * i128::from(part_bps) / i128::from(total_bps);
    i64::try_from(raw)
        .map(Fixed::from_raw)
        .map_err(|_| ArithmeticError::Overflow)
}

//! Logarithmic Market Scoring Rule (LMSR) implementation.
//!
//! Prices and costs for a binary market, all in 9-decimal fixed point.
//! Reference: Hanson (2003) "Combinatorial Information Market Design"
//!
//! - `C(q) = b · ln(e^{q_yes/b} + e^{q_no/b})`, evaluated as
//!   `b · (max + ln(1 + e^{−|x−y|}))` so no exponent ever exceeds zero
//! - `p_yes = e^{q_yes/b} / Σ`, `p_no = 1 − p_yes` (sums to exactly one)
//! - buys are solved by bisection over the share count until the curve
//!   cost matches the requested spend
//!
//! Quantities are bounded by `q/b ≤ 20` (the `exp` domain); anything
//! beyond is rejected before evaluation.

use serde::{Deserialize, Serialize};

use super::error::{ArithmeticError, MarketError};
use super::fixed_point::{Fixed, LN_2, MAX_EXP_ARG};
use super::trade::Side;

/// Iteration cap for the inverse solvers.
pub const MAX_ITERATIONS: u32 = 50;

/// Bracket width (in shares) at which the solver stops.
pub const SHARE_TOLERANCE: Fixed = Fixed::from_raw(1_000);

/// Cost distance to the target at which the solver stops early.
pub const COST_TOLERANCE: Fixed = Fixed::from_raw(1_000);

/// LMSR pricing model for binary outcome markets.
///
/// The liquidity parameter `b` controls market depth:
/// - Higher `b` = deeper market, slower price movement, larger subsidy
/// - Lower `b` = thinner market, faster price movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmsrModel {
    /// Liquidity parameter (b > 0)
    b: Fixed,
}

impl LmsrModel {
    /// Creates a model, rejecting non-positive `b`.
    pub fn new(b: Fixed) -> Result<Self, MarketError> {
        if !b.is_positive() {
            return Err(MarketError::InvalidParameter(format!(
                "liquidity parameter must be positive, got {b}"
            )));
        }
        Ok(Self { b })
    }

    /// Returns the liquidity parameter.
    pub const fn liquidity(&self) -> Fixed {
        self.b
    }

    /// Largest quantity either side may reach (`20 · b`).
    pub fn max_quantity(&self) -> Result<Fixed, MarketError> {
        Ok(self.b.checked_mul(MAX_EXP_ARG)?)
    }

    /// Maximum subsidy the market maker can lose: `b · ln 2`.
    pub fn max_loss(&self) -> Result<Fixed, MarketError> {
        Ok(self.b.checked_mul(LN_2)?)
    }

    /// `q / b`, validated against the exponential domain.
    fn quantity_ratio(&self, q: Fixed) -> Result<Fixed, MarketError> {
        if q.is_negative() {
            return Err(ArithmeticError::OutOfDomain {
                operation: "negative quantity",
            }
            .into());
        }
        let ratio = Fixed::ratio(q, self.b)?;
        if ratio > MAX_EXP_ARG {
            return Err(ArithmeticError::OutOfDomain {
                operation: "quantity ratio",
            }
            .into());
        }
        Ok(ratio)
    }

    /// Computes the LMSR cost function `C(q_yes, q_no)`.
    pub fn cost(&self, q_yes: Fixed, q_no: Fixed) -> Result<Fixed, MarketError> {
        let x = self.quantity_ratio(q_yes)?;
        let y = self.quantity_ratio(q_no)?;
        let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
        let spread = hi.checked_sub(lo)?;
        let tail = Fixed::ZERO.checked_sub(spread)?.exp()?;
        let log_sum = hi.checked_add(Fixed::ONE.checked_add(tail)?.ln()?)?;
        Ok(self.b.checked_mul(log_sum)?)
    }

    /// Marginal prices `(p_yes, p_no)`, each in (0, 1), summing to one.
    pub fn prices(&self, q_yes: Fixed, q_no: Fixed) -> Result<(Fixed, Fixed), MarketError> {
        let x = self.quantity_ratio(q_yes)?;
        let y = self.quantity_ratio(q_no)?;
        let spread = x.checked_sub(y)?.checked_abs()?;
        let tail = Fixed::ZERO.checked_sub(spread)?.exp()?;
        let denominator = Fixed::ONE.checked_add(tail)?;

        let p_yes = if x >= y {
            Fixed::ratio(Fixed::ONE, denominator)?
        } else {
            Fixed::ratio(tail, denominator)?
        };
        let p_no = Fixed::ONE.checked_sub(p_yes)?;
        Ok((p_yes, p_no))
    }

    /// Marginal price of one side.
    pub fn price(&self, q_yes: Fixed, q_no: Fixed, side: Side) -> Result<Fixed, MarketError> {
        let (yes, no) = self.prices(q_yes, q_no)?;
        Ok(match side {
            Side::Yes => yes,
            Side::No => no,
        })
    }

    /// Curve cost of minting `shares` on `side`.
    pub fn cost_to_buy(
        &self,
        q_yes: Fixed,
        q_no: Fixed,
        side: Side,
        shares: Fixed,
    ) -> Result<Fixed, MarketError> {
        let (next_yes, next_no) = shift(q_yes, q_no, side, shares)?;
        let before = self.cost(q_yes, q_no)?;
        let after = self.cost(next_yes, next_no)?;
        Ok(after.checked_sub(before)?)
    }

    /// Curve proceeds of burning `shares` on `side`.
    ///
    /// Fails with [`MarketError::MarketFloorViolation`] if the side would
    /// drop below `floor`.
    pub fn proceeds_from_sell(
        &self,
        q_yes: Fixed,
        q_no: Fixed,
        side: Side,
        shares: Fixed,
        floor: Fixed,
    ) -> Result<Fixed, MarketError> {
        let current = side_quantity(q_yes, q_no, side);
        let remaining = current.checked_sub(shares)?;
        if remaining < floor {
            return Err(MarketError::MarketFloorViolation {
                side,
                floor,
                attempted: shares,
            });
        }
        let negated = Fixed::ZERO.checked_sub(shares)?;
        let (next_yes, next_no) = shift(q_yes, q_no, side, negated)?;
        let before = self.cost(q_yes, q_no)?;
        let after = self.cost(next_yes, next_no)?;
        Ok(before.checked_sub(after)?)
    }

    /// Shares purchasable on `side` for a curve spend of `target`.
    pub fn shares_for_cost(
        &self,
        q_yes: Fixed,
        q_no: Fixed,
        side: Side,
        target: Fixed,
    ) -> Result<Fixed, MarketError> {
        if !target.is_positive() {
            return Err(MarketError::InvalidParameter(format!(
                "target cost must be positive, got {target}"
            )));
        }
        let headroom = self
            .max_quantity()?
            .checked_sub(side_quantity(q_yes, q_no, side))?;
        if !headroom.is_positive() {
            return Err(ArithmeticError::OutOfDomain {
                operation: "quantity ratio",
            }
            .into());
        }
        if self.cost_to_buy(q_yes, q_no, side, headroom)? < target {
            return Err(MarketError::InvalidParameter(format!(
                "target cost {target} exceeds curve depth"
            )));
        }
        bisect(headroom, target, MAX_ITERATIONS, |shares| {
            self.cost_to_buy(q_yes, q_no, side, shares)
        })
    }

    /// Shares to sell on `side` so that curve proceeds reach `target`.
    pub fn shares_for_proceeds(
        &self,
        q_yes: Fixed,
        q_no: Fixed,
        side: Side,
        target: Fixed,
        floor: Fixed,
    ) -> Result<Fixed, MarketError> {
        if !target.is_positive() {
            return Err(MarketError::InvalidParameter(format!(
                "target proceeds must be positive, got {target}"
            )));
        }
        let sellable = side_quantity(q_yes, q_no, side).checked_sub(floor)?;
        if !sellable.is_positive()
            || self.proceeds_from_sell(q_yes, q_no, side, sellable, floor)? < target
        {
            return Err(MarketError::InvalidParameter(format!(
                "target proceeds {target} exceed sellable depth above the floor"
            )));
        }
        bisect(sellable, target, MAX_ITERATIONS, |shares| {
            self.proceeds_from_sell(q_yes, q_no, side, shares, floor)
        })
    }

    /// Solves a buy and returns `(shares, exact curve cost of those shares)`.
    pub fn quote_buy(
        &self,
        q_yes: Fixed,
        q_no: Fixed,
        side: Side,
        target: Fixed,
    ) -> Result<(Fixed, Fixed), MarketError> {
        let shares = self.shares_for_cost(q_yes, q_no, side, target)?;
        if !shares.is_positive() {
            return Err(MarketError::InvalidParameter(format!(
                "spend {target} buys no shares"
            )));
        }
        let cost = self.cost_to_buy(q_yes, q_no, side, shares)?;
        Ok((shares, cost))
    }
}

const fn side_quantity(q_yes: Fixed, q_no: Fixed, side: Side) -> Fixed {
    match side {
        Side::Yes => q_yes,
        Side::No => q_no,
    }
}

fn shift(q_yes: Fixed, q_no: Fixed, side: Side, delta: Fixed) -> Result<(Fixed, Fixed), ArithmeticError> {
    Ok(match side {
        Side::Yes => (q_yes.checked_add(delta)?, q_no),
        Side::No => (q_yes, q_no.checked_add(delta)?),
    })
}

/// Bisection over `[0, upper]` for a monotonically increasing `eval`.
///
/// Returns the lower bracket bound once the bracket is narrower than
/// [`SHARE_TOLERANCE`], or the midpoint once `eval` lands within
/// [`COST_TOLERANCE`] of the target.
fn bisect<F>(upper: Fixed, target: Fixed, iterations: u32, eval: F) -> Result<Fixed, MarketError>
where
    F: Fn(Fixed) -> Result<Fixed, MarketError>,
{
    let mut lo = Fixed::ZERO;
    let mut hi = upper;
    for _ in 0..iterations {
        let gap = hi.checked_sub(lo)?;
        if gap <= SHARE_TOLERANCE {
            return Ok(lo);
        }
        let mid = lo.checked_add(Fixed::from_raw(gap.raw() / 2))?;
        let value = eval(mid)?;
        if value.checked_sub(target)?.checked_abs()? <= COST_TOLERANCE {
            return Ok(mid);
        }
        if value < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    if hi.checked_sub(lo)? <= SHARE_TOLERANCE {
        Ok(lo)
    } else {
        Err(ArithmeticError::NoConvergence { iterations }.into())
    }
}

//! Settlement math.
//!
//! At finalization the market freezes a [`SettlementSnapshot`]; every
//! claim is computed from that snapshot and the claimant's immutable
//! position, so payouts do not depend on claim order.
//!
//! - YES/NO: each winning share redeems for exactly one unit
//! - INVALID: the net curve cash is refunded pro-rata to each position's
//!   net contribution (`invested − proceeds`, floored at zero). Cash a
//!   trader already took out through sells is deducted from the amount
//!   invested, so it is not refunded a second time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MarketError;
use super::fixed_point::Fixed;
use super::market::{Market, MarketState};
use super::position::Position;
use super::trade::{LiquidityWithdrawal, Outcome};

/// Frozen payout basis of a finalized market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub outcome: Outcome,
    /// Winning shares in trader hands (binary outcomes).
    pub winning_supply: Fixed,
    /// Cash refunded pro-rata on INVALID.
    pub refund_pool: Fixed,
    /// Σ refund weights over all positions (INVALID).
    pub refund_weight: Fixed,
    pub settled_at: DateTime<Utc>,
}

impl SettlementSnapshot {
    /// Freezes the payout basis of a finalized market.
    pub fn capture(market: &Market, positions: &[Position], now: DateTime<Utc>) -> Result<Self, MarketError> {
        let Some(outcome) = market.final_outcome() else {
            return Err(MarketError::InvalidState {
                state: market.state(),
                operation: "settle without a final outcome",
            });
        };

        let snapshot = match outcome.winning_side() {
            Some(side) => Self {
                outcome,
                winning_supply: market.outstanding(side)?,
                refund_pool: Fixed::ZERO,
                refund_weight: Fixed::ZERO,
                settled_at: now,
            },
            None => {
                let mut weight = Fixed::ZERO;
                for position in positions.iter().filter(|p| p.market_id == market.id) {
                    weight = weight.checked_add(position.refund_weight())?;
                }
                Self {
                    outcome,
                    winning_supply: Fixed::ZERO,
                    refund_pool: market.net_collected().max(Fixed::ZERO),
                    refund_weight: weight,
                    settled_at: now,
                }
            }
        };
        Ok(snapshot)
    }

    /// Upper bound on the sum of all claims.
    pub fn obligations(&self) -> Fixed {
        match self.outcome {
            Outcome::Yes | Outcome::No => self.winning_supply,
            Outcome::Invalid => self.refund_pool,
        }
    }

    /// Amount owed to `position`.
    pub fn payout(&self, position: &Position) -> Result<Fixed, MarketError> {
        match self.outcome.winning_side() {
            Some(side) => Ok(position.shares(side)),
            None => {
                if !self.refund_weight.is_positive() {
                    return Ok(Fixed::ZERO);
                }
                Ok(self
                    .refund_pool
                    .mul_div(position.refund_weight(), self.refund_weight)?)
            }
        }
    }
}

/// What the creator may withdraw once the market is settled: backing
/// liquidity plus curve cash beyond the settlement obligations, plus the
/// liquidity and creator fee slices.
pub fn liquidity_withdrawal(market: &Market) -> Result<LiquidityWithdrawal, MarketError> {
    let Some(snapshot) = market.settlement() else {
        return Err(MarketError::InvalidState {
            state: market.state(),
            operation: "withdraw liquidity before settlement",
        });
    };
    if market.state() != MarketState::Finalized {
        return Err(MarketError::InvalidState {
            state: market.state(),
            operation: "withdraw liquidity",
        });
    }

    let liquidity = market
        .backer_liquidity()
        .checked_add(market.net_collected())?
        .checked_sub(snapshot.obligations())?
        .max(Fixed::ZERO);
    let liquidity_fees = market.fees().liquidity;
    let creator_fees = market.fees().creator;
    let total = liquidity.checked_add(liquidity_fees)?.checked_add(creator_fees)?;

    Ok(LiquidityWithdrawal {
        market_id: market.id.clone(),
        creator: market.creator.clone(),
        liquidity,
        liquidity_fees,
        creator_fees,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::FeeSchedule;
    use crate::domain::market::MarketParams;
    use crate::domain::trade::{ContentHash, Side};
    use crate::domain::vote::{PhaseRule, Tally, VotePhase};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn fx(value: rust_decimal::Decimal) -> Fixed {
        Fixed::from_decimal(value).unwrap()
    }

    struct Book {
        market: Market,
        positions: Vec<Position>,
    }

    impl Book {
        fn new() -> Self {
            let now = Utc::now();
            let mut market = Market::new(
                "m1".into(),
                "creator".into(),
                MarketParams {
                    question_hash: ContentHash::default(),
                    liquidity: fx(dec!(100)),
                    backer_liquidity: fx(dec!(70)),
                    expires_at: None,
                },
                fx(dec!(0.1)),
                now,
            )
            .unwrap();
            let tally = Tally {
                phase: VotePhase::Proposal,
                round: 0,
                affirmative: 1,
                negative: 0,
                ignored: 0,
            };
            market
                .apply_proposal_tally(tally, &PhaseRule { threshold_bps: 5_000, quorum: 1 }, now)
                .unwrap();
            market.activate(now).unwrap();
            Self {
                market,
                positions: Vec::new(),
            }
        }

        fn buy(&mut self, trader: &str, side: Side, spend: Fixed) {
            let m = &mut self.market;
            let (shares, cost) = m.model().quote_buy(m.q_yes(), m.q_no(), side, spend).unwrap();
            let fees = FeeSchedule::default().split(cost).unwrap();
            m.apply_buy(side, shares, cost, &fees, Utc::now()).unwrap();
            let mut position = Position::new("m1".into(), trader.into(), Utc::now());
            position
                .apply_buy(side, shares, cost, fees.total, Utc::now())
                .unwrap();
            self.positions.push(position);
        }

        fn sell_half(&mut self, index: usize, side: Side) {
            let m = &mut self.market;
            let shares = Fixed::from_raw(self.positions[index].shares(side).raw() / 2);
            let proceeds = m
                .model()
                .proceeds_from_sell(m.q_yes(), m.q_no(), side, shares, m.share_floor())
                .unwrap();
            let fees = FeeSchedule::default().split(proceeds).unwrap();
            m.apply_sell(side, shares, proceeds, &fees, Utc::now()).unwrap();
            self.positions[index]
                .apply_sell(side, shares, proceeds, fees.total, Utc::now())
                .unwrap();
        }

        fn finalize(&mut self, outcome: Outcome) -> SettlementSnapshot {
            let now = Utc::now();
            self.market
                .propose_resolution("oracle".into(), outcome, ContentHash::default(), now, Duration::zero())
                .unwrap();
            self.market.finalize(now, Duration::zero()).unwrap();
            let snapshot = SettlementSnapshot::capture(&self.market, &self.positions, now).unwrap();
            self.market.install_settlement(snapshot.clone()).unwrap();
            snapshot
        }
    }

    #[test]
    fn test_winning_shares_redeem_one_to_one() {
        let mut book = Book::new();
        book.buy("alice", Side::Yes, fx(dec!(10)));
        book.buy("bob", Side::No, fx(dec!(5)));
        let snapshot = book.finalize(Outcome::Yes);

        let alice = snapshot.payout(&book.positions[0]).unwrap();
        let bob = snapshot.payout(&book.positions[1]).unwrap();
        assert_eq!(alice, book.positions[0].shares(Side::Yes));
        assert_eq!(bob, Fixed::ZERO);
        assert_eq!(alice, snapshot.winning_supply);
    }

    #[test]
    fn test_invalid_refunds_are_proportional_to_contribution() {
        let mut book = Book::new();
        book.buy("alice", Side::Yes, fx(dec!(10)));
        book.buy("bob", Side::No, fx(dec!(30)));
        let snapshot = book.finalize(Outcome::Invalid);

        let alice = snapshot.payout(&book.positions[0]).unwrap();
        let bob = snapshot.payout(&book.positions[1]).unwrap();
        // refund pool equals what was paid in, so each gets back their curve cost
        let alice_paid = book.positions[0].total_invested();
        let bob_paid = book.positions[1].total_invested();
        assert!(alice.checked_sub(alice_paid).unwrap().checked_abs().unwrap() <= Fixed::from_raw(1));
        assert!(bob.checked_sub(bob_paid).unwrap().checked_abs().unwrap() <= Fixed::from_raw(1));

        let ratio = Fixed::ratio(bob, alice).unwrap();
        let expected = Fixed::ratio(bob_paid, alice_paid).unwrap();
        assert!(ratio.checked_sub(expected).unwrap().checked_abs().unwrap() <= Fixed::from_raw(10));
        assert!(alice.checked_add(bob).unwrap() <= snapshot.refund_pool);
    }

    #[test]
    fn test_invalid_refund_deducts_sell_proceeds() {
        let mut book = Book::new();
        book.buy("alice", Side::Yes, fx(dec!(10)));
        book.buy("bob", Side::No, fx(dec!(10)));
        book.sell_half(0, Side::Yes);
        let snapshot = book.finalize(Outcome::Invalid);

        let alice = &book.positions[0];
        let weight = alice.total_invested().checked_sub(alice.total_proceeds()).unwrap();
        assert_eq!(alice.refund_weight(), weight);
        assert!(weight < alice.total_invested());

        let refund = snapshot.payout(alice).unwrap();
        assert!(refund.checked_sub(weight).unwrap().checked_abs().unwrap() <= Fixed::from_raw(1));
    }

    #[test]
    fn test_invalid_with_no_contributions_pays_nothing() {
        let mut book = Book::new();
        let snapshot = book.finalize(Outcome::Invalid);
        let empty = Position::new("m1".into(), "nobody".into(), Utc::now());
        assert_eq!(snapshot.payout(&empty).unwrap(), Fixed::ZERO);
    }

    #[test]
    fn test_withdrawal_returns_backing_plus_surplus_and_fees() {
        let mut book = Book::new();
        book.buy("alice", Side::Yes, fx(dec!(10)));
        book.buy("bob", Side::No, fx(dec!(10)));
        let snapshot = book.finalize(Outcome::No);
        let withdrawal = liquidity_withdrawal(&book.market).unwrap();

        let expected_liquidity = book
            .market
            .backer_liquidity()
            .checked_add(book.market.net_collected())
            .unwrap()
            .checked_sub(snapshot.winning_supply)
            .unwrap();
        assert_eq!(withdrawal.liquidity, expected_liquidity);
        assert_eq!(withdrawal.liquidity_fees, book.market.fees().liquidity);
        assert_eq!(withdrawal.creator_fees, book.market.fees().creator);
        assert!(withdrawal.liquidity.is_positive());
    }

    #[test]
    fn test_withdrawal_requires_settlement() {
        let book = Book::new();
        assert!(liquidity_withdrawal(&book.market).is_err());
    }
}

//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that the fixed-point kernel, the LMSR
//! curve, the fee split and the vote threshold rule hold their
//! invariants across random inputs.

use proptest::prelude::*;

use prediction_market_engine::domain::fees::FeeSchedule;
use prediction_market_engine::domain::fixed_point::{Fixed, SCALE};
use prediction_market_engine::domain::lmsr::LmsrModel;
use prediction_market_engine::domain::trade::Side;
use prediction_market_engine::domain::vote::{PhaseRule, Tally, Verdict, VotePhase};

fn units(n: i64) -> Fixed {
    Fixed::from_raw(n * SCALE)
}

fn side(yes: bool) -> Side {
    if yes { Side::Yes } else { Side::No }
}

// ── Fixed-Point Kernel Properties ───────────────────────────

proptest! {
    /// ln is the inverse of exp over the well-conditioned range.
    #[test]
    fn ln_inverts_exp(raw in -2 * SCALE..10 * SCALE) {
        let x = Fixed::from_raw(raw);
        let back = x.exp().unwrap().ln().unwrap();
        let err = (back.raw() - raw).abs();
        prop_assert!(err <= 100, "ln(exp({x})) = {back}, error {err} raw");
    }

    /// exp is monotonic.
    #[test]
    fn exp_monotonic(a in -20 * SCALE..20 * SCALE, b in -20 * SCALE..20 * SCALE) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let e_lo = Fixed::from_raw(lo).exp().unwrap();
        let e_hi = Fixed::from_raw(hi).exp().unwrap();
        prop_assert!(e_lo <= e_hi);
    }

    /// Arithmetic errors instead of wrapping.
    #[test]
    fn checked_mul_never_wraps(a in any::<i64>(), b in any::<i64>()) {
        let (fa, fb) = (Fixed::from_raw(a), Fixed::from_raw(b));
        if let Ok(product) = fa.checked_mul(fb) {
            let exact = i128::from(a) * i128::from(b) / i128::from(SCALE);
            prop_assert!((i128::from(product.raw()) - exact).abs() <= 1);
        }
    }
}

// ── LMSR Curve Properties ───────────────────────────────────

proptest! {
    /// Prices stay in (0, 1) and sum to exactly one.
    #[test]
    fn prices_in_unit_interval_and_sum_to_one(
        b in 10i64..1_000,
        qy in 0i64..10_000,
        qn in 0i64..10_000,
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        // keep both sides inside the 20·b domain
        let q_yes = Fixed::from_raw(qy * b * SCALE / 1_000 + SCALE / 10);
        let q_no = Fixed::from_raw(qn * b * SCALE / 1_000 + SCALE / 10);
        let (yes, no) = model.prices(q_yes, q_no).unwrap();
        prop_assert!(yes.raw() >= 0 && yes <= Fixed::ONE);
        prop_assert!(no.raw() >= 0 && no <= Fixed::ONE);
        prop_assert_eq!(yes.checked_add(no).unwrap(), Fixed::ONE);
    }

    /// Buying a side never lowers its price.
    #[test]
    fn buying_raises_price(
        b in 10i64..1_000,
        shares in 1i64..500,
        yes in any::<bool>(),
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        let floor = Fixed::from_raw(SCALE / 10);
        let shares = shares % (19 * b) + 1;
        let s = side(yes);
        let before = model.price(floor, floor, s).unwrap();
        let (q_yes, q_no) = match s {
            Side::Yes => (floor.checked_add(units(shares)).unwrap(), floor),
            Side::No => (floor, floor.checked_add(units(shares)).unwrap()),
        };
        let after = model.price(q_yes, q_no, s).unwrap();
        prop_assert!(after >= before);
    }

    /// Selling back what was just bought returns exactly what it cost.
    #[test]
    fn buy_then_sell_is_path_independent(
        b in 10i64..1_000,
        shares in 1i64..500,
        yes in any::<bool>(),
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        let floor = Fixed::from_raw(SCALE / 10);
        let s = side(yes);
        let bought = units(shares % (19 * b) + 1);
        let cost = model.cost_to_buy(floor, floor, s, bought).unwrap();
        let (q_yes, q_no) = match s {
            Side::Yes => (floor.checked_add(bought).unwrap(), floor),
            Side::No => (floor, floor.checked_add(bought).unwrap()),
        };
        let proceeds = model.proceeds_from_sell(q_yes, q_no, s, bought, floor).unwrap();
        prop_assert_eq!(cost, proceeds);
        prop_assert!(cost.is_positive());
        prop_assert!(cost < bought, "each share costs less than one unit");
    }

    /// The inverse solver lands on the requested spend.
    #[test]
    fn solver_matches_target_cost(
        b in 10i64..1_000,
        spend_cents in 1i64..100_000,
        yes in any::<bool>(),
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        let floor = Fixed::from_raw(SCALE / 10);
        // stay well inside the curve depth (~19·b)
        let target = Fixed::from_raw((spend_cents * SCALE / 100).min(10 * b * SCALE));
        let (shares, cost) = model.quote_buy(floor, floor, side(yes), target).unwrap();
        prop_assert!(shares.is_positive());
        prop_assert!(shares > target, "below price one, a spend buys more shares than units");
        let err = (cost.raw() - target.raw()).abs();
        prop_assert!(err <= 100_000, "cost {cost} vs target {target}");
    }

    /// The market maker never loses more than b·ln2 when a single side
    /// is pushed to the edge of the domain.
    #[test]
    fn loss_bounded_by_subsidy(b in 10i64..1_000, push in 1i64..19) {
        let model = LmsrModel::new(units(b)).unwrap();
        let floor = Fixed::from_raw(SCALE / 10);
        let bought = units(push * b);
        let collected = model.cost_to_buy(floor, floor, Side::Yes, bought).unwrap();
        // every traded share pays out one unit if YES wins
        let loss = bought.checked_sub(collected).unwrap();
        let bound = model.max_loss().unwrap();
        // rounding slack proportional to b
        let slack = Fixed::from_raw(b * 100 + 1_000);
        prop_assert!(loss <= bound.checked_add(slack).unwrap(), "loss {loss} > bound {bound}");
    }
}

// ── Trade Sequence Properties ───────────────────────────────

proptest! {
    /// Over any sequence of buys and sells the backer's worst-case loss
    /// stays within b·ln2.
    #[test]
    fn loss_bounded_over_trade_sequences(
        b in 50i64..500,
        ops in prop::collection::vec((any::<bool>(), any::<bool>(), 1i64..40), 1..20),
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        let floor = Fixed::from_raw(SCALE / 10);
        let (mut q_yes, mut q_no) = (floor, floor);
        let mut collected = Fixed::ZERO;
        let bound = model.max_loss().unwrap();
        let slack = Fixed::from_raw(b * 100 + 1_000);

        for (yes, sell, n) in ops {
            let s = side(yes);
            let held = match s {
                Side::Yes => q_yes.checked_sub(floor).unwrap(),
                Side::No => q_no.checked_sub(floor).unwrap(),
            };
            let delta = if sell {
                let amount = units(n).min(held);
                if !amount.is_positive() {
                    continue;
                }
                let proceeds = model.proceeds_from_sell(q_yes, q_no, s, amount, floor).unwrap();
                collected = collected.checked_sub(proceeds).unwrap();
                Fixed::ZERO.checked_sub(amount).unwrap()
            } else {
                let cost = model.cost_to_buy(q_yes, q_no, s, units(n)).unwrap();
                collected = collected.checked_add(cost).unwrap();
                units(n)
            };
            match s {
                Side::Yes => q_yes = q_yes.checked_add(delta).unwrap(),
                Side::No => q_no = q_no.checked_add(delta).unwrap(),
            }

            let owed = q_yes.max(q_no).checked_sub(floor).unwrap();
            let loss = owed.checked_sub(collected).unwrap();
            prop_assert!(loss <= bound.checked_add(slack).unwrap(), "loss {loss} > bound {bound}");
            prop_assert!(q_yes >= floor && q_no >= floor);
        }
    }

    /// The fixed-point cost function converges to the f64 reference.
    #[test]
    fn cost_matches_float_reference(
        b in 10i64..1_000,
        qy in 0i64..10_000,
        qn in 0i64..10_000,
    ) {
        let model = LmsrModel::new(units(b)).unwrap();
        let q_yes = Fixed::from_raw(qy * b * SCALE / 1_000 + SCALE / 10);
        let q_no = Fixed::from_raw(qn * b * SCALE / 1_000 + SCALE / 10);
        let fixed = model.cost(q_yes, q_no).unwrap().to_f64();

        let bf = b as f64;
        let (x, y) = (q_yes.to_f64() / bf, q_no.to_f64() / bf);
        let hi = x.max(y);
        let reference = bf * (hi + ((x - hi).exp() + (y - hi).exp()).ln());
        let tolerance = 1e-6 * reference.abs().max(1.0);
        prop_assert!((fixed - reference).abs() <= tolerance, "fixed {fixed} vs f64 {reference}");
    }
}

// ── Fee Split Properties ────────────────────────────────────

proptest! {
    /// Components always sum to the total, which is the truncated rate.
    #[test]
    fn fee_components_sum_to_total(
        amount in 0i64..1_000_000 * SCALE,
        protocol in 0u16..3_000,
        creator in 0u16..3_000,
        liquidity in 0u16..3_000,
    ) {
        let schedule = FeeSchedule::new(protocol, creator, liquidity).unwrap();
        let split = schedule.split(Fixed::from_raw(amount)).unwrap();
        let sum = split.protocol.checked_add(split.creator).unwrap().checked_add(split.liquidity).unwrap();
        prop_assert_eq!(sum, split.total);
        let expected = i128::from(amount) * i128::from(schedule.total_bps()) / 10_000;
        prop_assert_eq!(i128::from(split.total.raw()), expected);
        prop_assert!(!split.liquidity.is_negative());
    }
}

// ── Vote Threshold Properties ───────────────────────────────

proptest! {
    /// The threshold rule agrees with exact rational comparison.
    #[test]
    fn threshold_is_exact(
        affirmative in 0u64..10_000,
        negative in 0u64..10_000,
        threshold_bps in 0u16..=10_000,
    ) {
        let tally = Tally {
            phase: VotePhase::Proposal,
            round: 0,
            affirmative,
            negative,
            ignored: 0,
        };
        let rule = PhaseRule { threshold_bps, quorum: 1 };
        let verdict = rule.decide(&tally);
        let total = affirmative + negative;
        if total == 0 {
            prop_assert_eq!(verdict, Verdict::BelowQuorum);
        } else if affirmative * 10_000 >= u64::from(threshold_bps) * total {
            prop_assert_eq!(verdict, Verdict::Passed);
        } else {
            prop_assert_eq!(verdict, Verdict::BelowThreshold);
        }
    }
}

//! Simulation Tests - Seeded Trading Sessions
//!
//! Runs deterministic pseudo-random trading sessions through the engine,
//! resolves them each way and checks that settlement conserves funds:
//! payouts plus the creator's withdrawal equal backing plus net curve
//! cash, and the market maker never loses more than its subsidy.
//! Also replays a session through the audit log, metrics and snapshot
//! store.

mod common;

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;

use common::{Harness, CREATOR, ORACLE};
use prediction_market_engine::adapters::memory::{InMemoryMarketRepository, InMemoryVoteStore};
use prediction_market_engine::adapters::metrics::{EngineMetrics, EventSink};
use prediction_market_engine::adapters::persistence::{AuditLog, EngineSnapshot, SnapshotStore};
use prediction_market_engine::domain::{ContentHash, Fixed, Outcome, Side};

const MARKET: &str = "sim";
const TRADERS: u64 = 8;

/// Linear congruential generator; enough to vary trade sequences reproducibly.
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

/// Session summary.
#[derive(Debug, Default)]
struct SessionResult {
    buys: usize,
    sells: usize,
    fees: Fixed,
}

fn trader(i: u64) -> String {
    format!("trader-{i}")
}

/// Random buys and partial sells on an active market.
async fn run_session(h: &Harness, seed: u64, steps: usize) -> SessionResult {
    let mut rng = Lcg(seed);
    let mut result = SessionResult::default();

    for _ in 0..steps {
        let who = trader(rng.next_u64() % TRADERS);
        let side = if rng.next_u64() % 2 == 0 { Side::Yes } else { Side::No };

        let held = h
            .engine
            .position(MARKET, &who)
            .await
            .map_or(Fixed::ZERO, |p| p.shares(side));
        let half = Fixed::from_raw(held.raw() / 2);

        if rng.next_u64() % 3 == 0 && half >= h.engine.config().min_trade_amount {
            let sold = h
                .engine
                .sell(MARKET, &who, side, half, Fixed::ZERO)
                .await
                .unwrap();
            result.sells += 1;
            result.fees = result.fees.checked_add(sold.fees.total).unwrap();
        } else {
            // 0.50 .. 5.00 units of curve spend
            let cents = i64::try_from(rng.next_u64() % 451 + 50).unwrap();
            let spend = Fixed::from_raw(cents * 10_000_000);
            let bought = h
                .engine
                .buy(MARKET, &who, side, spend, Fixed::from_int(10).unwrap())
                .await
                .unwrap();
            result.buys += 1;
            result.fees = result.fees.checked_add(bought.fees.total).unwrap();
        }
    }
    result
}

/// Expire, resolve to `outcome` and finalize.
async fn settle(h: &Harness, outcome: Outcome) {
    h.clock.advance(Duration::days(8));
    h.engine.expire(MARKET).await.unwrap();
    h.engine
        .propose_resolution(ORACLE, MARKET, outcome, ContentHash::of(b"simulated evidence"))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(49));
    assert_eq!(h.engine.finalize(MARKET).await.unwrap(), outcome);
}

/// Claims every trader's payout; returns the sum.
async fn claim_all(h: &Harness) -> Fixed {
    let mut paid = Fixed::ZERO;
    for position in h.engine.positions(MARKET).await.unwrap() {
        let receipt = h.engine.claim(MARKET, &position.trader).await.unwrap();
        paid = paid.checked_add(receipt.payout).unwrap();
    }
    paid
}

#[tokio::test]
async fn test_simulation_conserves_funds_for_every_outcome() {
    for (seed, outcome) in [(7, Outcome::Yes), (42, Outcome::No), (1_337, Outcome::Invalid)] {
        let h = Harness::new();
        h.active_market(MARKET).await;
        let session = run_session(&h, seed, 150).await;
        assert!(session.buys > 0 && session.sells > 0, "seed {seed}: {session:?}");

        let market = h.engine.market(MARKET).await.unwrap();
        assert_eq!(market.fees().total, session.fees);
        let loss = market.worst_case_loss().unwrap();
        assert!(loss <= market.backer_liquidity(), "seed {seed}: loss {loss}");

        settle(&h, outcome).await;
        let market = h.engine.market(MARKET).await.unwrap();
        let available = market
            .backer_liquidity()
            .checked_add(market.net_collected())
            .unwrap();
        let obligations = market.settlement().unwrap().obligations();

        let paid = claim_all(&h).await;
        let withdrawal = h.engine.withdraw_liquidity(CREATOR, MARKET).await.unwrap();

        assert!(paid <= obligations, "seed {seed}: paid {paid} > owed {obligations}");
        match outcome {
            Outcome::Yes | Outcome::No => assert_eq!(paid, obligations),
            // pro-rata division truncates by at most one raw unit per claimant
            Outcome::Invalid => {
                assert!(obligations.raw() - paid.raw() <= i64::try_from(TRADERS).unwrap());
            }
        }
        assert_eq!(
            withdrawal.liquidity.checked_add(obligations).unwrap(),
            available,
            "seed {seed}"
        );

        let market = h.engine.market(MARKET).await.unwrap();
        assert_eq!(market.claimed_total(), paid);
        market.check_invariants().unwrap();
    }
}

#[tokio::test]
async fn test_simulation_is_deterministic() {
    let first = Harness::new();
    first.active_market(MARKET).await;
    run_session(&first, 99, 60).await;

    let second = Harness::new();
    second.active_market(MARKET).await;
    run_session(&second, 99, 60).await;

    let (a, b) = (
        first.engine.stats(MARKET).await.unwrap(),
        second.engine.stats(MARKET).await.unwrap(),
    );
    assert_eq!(a.q_yes, b.q_yes);
    assert_eq!(a.q_no, b.q_no);
    assert_eq!(a.net_collected, b.net_collected);
    assert_eq!(a.trade_count, 60);
}

#[tokio::test]
async fn test_session_replays_into_audit_log_and_metrics() {
    let mut h = Harness::new();
    h.active_market(MARKET).await;
    let session = run_session(&h, 5, 40).await;
    settle(&h, Outcome::Yes).await;
    claim_all(&h).await;

    let events = h.drain();
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditLog::open(dir.path().to_str().unwrap()).await.unwrap());
    let metrics = Arc::new(EngineMetrics::new().unwrap());
    let sink = EventSink::new()
        .with_audit(Arc::clone(&audit))
        .with_metrics(Arc::clone(&metrics));

    let (tx, rx) = mpsc::unbounded_channel();
    for event in events.iter().cloned() {
        tx.send(event).unwrap();
    }
    drop(tx);
    let handled = sink.run(rx).await;

    assert_eq!(handled, events.len() as u64);
    assert_eq!(audit.verify().await.unwrap(), handled);

    let trades = metrics.trades.with_label_values(&["buy", "YES"]).get()
        + metrics.trades.with_label_values(&["buy", "NO"]).get()
        + metrics.trades.with_label_values(&["sell", "YES"]).get()
        + metrics.trades.with_label_values(&["sell", "NO"]).get();
    assert_eq!(trades, (session.buys + session.sells) as u64);
    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("market_engine_claims_paid_total"));
}

#[tokio::test]
async fn test_snapshot_restores_session_state() {
    let h = Harness::new();
    h.active_market(MARKET).await;
    run_session(&h, 11, 30).await;

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().to_str().unwrap()).await.unwrap();
    let snapshot = EngineSnapshot::capture(&h.repo, &h.votes, h.engine.config().version).await;
    store.save(&snapshot).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.config_version, 1);
    assert_eq!(loaded.votes.len(), 10);

    let repo = InMemoryMarketRepository::new();
    let votes = InMemoryVoteStore::new();
    loaded.restore_into(&repo, &votes).await;
    assert_eq!(repo.dump().await, h.repo.dump().await);
    assert_eq!(votes.dump().await, h.votes.dump().await);
}

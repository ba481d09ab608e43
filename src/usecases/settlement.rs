//! Settlement Use Case - Claims and Liquidity Withdrawal
//!
//! Payouts come from the snapshot frozen at finalization, so they do not
//! depend on the order in which traders claim.
//!
//! Claim flow:
//! 1. Require a finalized market with a settlement snapshot
//! 2. Load the trader's position (one claim per position)
//! 3. Compute the payout from the snapshot and the immutable position
//! 4. Mark the position claimed and add the payout to the market total
//! 5. Commit both records atomically

use tracing::{info, instrument};

use super::engine::MarketEngine;
use super::events::EngineEvent;
use crate::domain::error::MarketError;
use crate::domain::fixed_point::Fixed;
use crate::domain::market::MarketState;
use crate::domain::settlement::liquidity_withdrawal;
use crate::domain::trade::{ClaimReceipt, LiquidityWithdrawal};
use crate::ports::{MarketRepository, VoteStore};

impl<R: MarketRepository, V: VoteStore> MarketEngine<R, V> {
  /// Amount `trader` would receive by claiming now.
  pub async fn claimable(&self, market_id: &str, trader: &str) -> Result<Fixed, MarketError> {
    let market = self.market(market_id).await?;
    let Some(snapshot) = market.settlement() else {
      return Err(MarketError::InvalidState {
        state: market.state(),
        operation: "claim",
      });
    };
    let position = self.position(market_id, trader).await?;
    if position.is_claimed() {
      return Ok(Fixed::ZERO);
    }
    snapshot.payout(&position)
  }

  /// Pay out `trader`'s position in a finalized market.
  ///
  /// A zero payout (losing side, or no refund weight) still succeeds and
  /// marks the position claimed.
  #[instrument(skip(self))]
  pub async fn claim(&self, market_id: &str, trader: &str) -> Result<ClaimReceipt, MarketError> {
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    if market.state() != MarketState::Finalized {
      return Err(MarketError::InvalidState {
        state: market.state(),
        operation: "claim",
      });
    }
    let Some(snapshot) = market.settlement().cloned() else {
      return Err(MarketError::InvalidState {
        state: market.state(),
        operation: "claim before settlement",
      });
    };

    let mut position = self.position(market_id, trader).await?;
    if position.is_claimed() {
      return Err(MarketError::AlreadyClaimed);
    }

    let now = self.clock.now();
    let payout = snapshot.payout(&position)?;
    position.mark_claimed(payout, now)?;
    market.record_claim(payout)?;

    let mut positions = [position];
    self.persist(&mut market, &mut positions).await?;

    info!(
      outcome = %snapshot.outcome,
      payout = %payout,
      claimed_total = %market.claimed_total(),
      "Claim paid"
    );
    self.emit(EngineEvent::Claimed {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      payout,
      at: now,
    });

    Ok(ClaimReceipt {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      outcome: snapshot.outcome,
      payout,
      claimed_at: now,
    })
  }

  /// Return the creator's backing, surplus curve cash and fee slices.
  #[instrument(skip(self))]
  pub async fn withdraw_liquidity(
    &self,
    actor: &str,
    market_id: &str,
  ) -> Result<LiquidityWithdrawal, MarketError> {
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    if actor != market.creator {
      return Err(MarketError::Unauthorized {
        actor: actor.to_string(),
        action: "withdraw liquidity",
      });
    }

    let withdrawal = liquidity_withdrawal(&market)?;
    market.mark_liquidity_withdrawn()?;
    self.persist(&mut market, &mut []).await?;

    info!(
      liquidity = %withdrawal.liquidity,
      liquidity_fees = %withdrawal.liquidity_fees,
      creator_fees = %withdrawal.creator_fees,
      total = %withdrawal.total,
      "Liquidity withdrawn"
    );
    self.emit(EngineEvent::LiquidityWithdrawn {
      market_id: market_id.to_string(),
      creator: actor.to_string(),
      total: withdrawal.total,
      at: self.clock.now(),
    });
    Ok(withdrawal)
  }
}

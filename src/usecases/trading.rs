//! Trading - Buys, Sells and Quotes
//!
//! Buys are specified by spend: the solver finds the share count whose
//! curve cost matches `target_cost`, fees are added on top, and the trade
//! is rejected whole if the total exceeds `max_cost`. Sells are specified
//! by share count; fees are deducted from the curve proceeds and the
//! trade is rejected if the net falls below `min_proceeds`. There are no
//! partial fills.

use tracing::{debug, info, instrument};

use super::engine::MarketEngine;
use super::events::EngineEvent;
use crate::domain::error::MarketError;
use crate::domain::fixed_point::Fixed;
use crate::domain::position::Position;
use crate::domain::trade::{BuyQuote, BuyReceipt, SellReceipt, Side, TradeKind};
use crate::ports::{MarketRepository, VoteStore};

impl<R: MarketRepository, V: VoteStore> MarketEngine<R, V> {
  /// Preview a buy without side effects.
  pub async fn quote_buy(
    &self,
    market_id: &str,
    side: Side,
    target_cost: Fixed,
  ) -> Result<BuyQuote, MarketError> {
    let config = self.config();
    let market = self.market(market_id).await?;
    let (shares, curve_cost) =
      market
        .model()
        .quote_buy(market.q_yes(), market.q_no(), side, target_cost)?;
    let fees = config.fees.split(curve_cost)?;
    Ok(BuyQuote {
      side,
      shares,
      curve_cost,
      fees,
      cost_paid: curve_cost.checked_add(fees.total)?,
    })
  }

  /// Shares of `side` to sell for `target_proceeds` of curve proceeds.
  pub async fn quote_sell_for_proceeds(
    &self,
    market_id: &str,
    side: Side,
    target_proceeds: Fixed,
  ) -> Result<Fixed, MarketError> {
    let market = self.market(market_id).await?;
    market.model().shares_for_proceeds(
      market.q_yes(),
      market.q_no(),
      side,
      target_proceeds,
      market.share_floor(),
    )
  }

  /// Buy `side` shares for a curve spend of `target_cost`.
  #[instrument(skip(self))]
  pub async fn buy(
    &self,
    market_id: &str,
    trader: &str,
    side: Side,
    target_cost: Fixed,
    max_cost: Fixed,
  ) -> Result<BuyReceipt, MarketError> {
    let config = self.config();
    if target_cost < config.min_trade_amount {
      return Err(MarketError::InvalidParameter(format!(
        "spend {target_cost} below minimum trade amount {}",
        config.min_trade_amount
      )));
    }

    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let now = self.clock.now();
    market.ensure_tradable(config.global_pause, now)?;

    let (shares, curve_cost) =
      market
        .model()
        .quote_buy(market.q_yes(), market.q_no(), side, target_cost)?;
    let fees = config.fees.split(curve_cost)?;
    let cost_paid = curve_cost.checked_add(fees.total)?;
    if cost_paid > max_cost {
      debug!(limit = %max_cost, actual = %cost_paid, "Buy rejected on slippage");
      return Err(MarketError::SlippageExceeded {
        limit: max_cost,
        actual: cost_paid,
      });
    }

    let mut position = self
      .repo
      .load_position(market_id, trader)
      .await?
      .unwrap_or_else(|| Position::new(market_id.to_string(), trader.to_string(), now));

    market.apply_buy(side, shares, curve_cost, &fees, now)?;
    position.apply_buy(side, shares, curve_cost, fees.total, now)?;
    let prices = market.prices()?;

    let mut positions = [position];
    self.persist(&mut market, &mut positions).await?;

    info!(
      side = %side,
      shares = %shares,
      curve_cost = %curve_cost,
      fees = %fees.total,
      price_yes = %prices.yes,
      "Buy executed"
    );
    self.emit(EngineEvent::TradeExecuted {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      kind: TradeKind::Buy,
      side,
      shares,
      amount: curve_cost,
      fees: fees.total,
      price_yes: prices.yes,
      at: now,
    });

    Ok(BuyReceipt {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      side,
      shares,
      curve_cost,
      fees,
      cost_paid,
      price_yes: prices.yes,
      price_no: prices.no,
      executed_at: now,
    })
  }

  /// Sell `shares` of `side` back to the curve.
  #[instrument(skip(self))]
  pub async fn sell(
    &self,
    market_id: &str,
    trader: &str,
    side: Side,
    shares: Fixed,
    min_proceeds: Fixed,
  ) -> Result<SellReceipt, MarketError> {
    let config = self.config();
    if shares < config.min_trade_amount {
      return Err(MarketError::InvalidParameter(format!(
        "sell size {shares} below minimum trade amount {}",
        config.min_trade_amount
      )));
    }

    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let now = self.clock.now();
    market.ensure_tradable(config.global_pause, now)?;

    // floor first: no sell may take a side below the floor, whoever holds what
    let gross_proceeds = market.model().proceeds_from_sell(
      market.q_yes(),
      market.q_no(),
      side,
      shares,
      market.share_floor(),
    )?;

    let mut position = self
      .repo
      .load_position(market_id, trader)
      .await?
      .ok_or_else(|| MarketError::InsufficientShares {
        held: Fixed::ZERO,
        requested: shares,
      })?;

    let fees = config.fees.split(gross_proceeds)?;
    let proceeds = gross_proceeds.checked_sub(fees.total)?;
    if proceeds < min_proceeds {
      debug!(limit = %min_proceeds, actual = %proceeds, "Sell rejected on slippage");
      return Err(MarketError::SlippageExceeded {
        limit: min_proceeds,
        actual: proceeds,
      });
    }

    position.apply_sell(side, shares, gross_proceeds, fees.total, now)?;
    market.apply_sell(side, shares, gross_proceeds, &fees, now)?;
    let prices = market.prices()?;

    let mut positions = [position];
    self.persist(&mut market, &mut positions).await?;

    info!(
      side = %side,
      shares = %shares,
      gross = %gross_proceeds,
      fees = %fees.total,
      price_yes = %prices.yes,
      "Sell executed"
    );
    self.emit(EngineEvent::TradeExecuted {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      kind: TradeKind::Sell,
      side,
      shares,
      amount: gross_proceeds,
      fees: fees.total,
      price_yes: prices.yes,
      at: now,
    });

    Ok(SellReceipt {
      market_id: market_id.to_string(),
      trader: trader.to_string(),
      side,
      shares,
      gross_proceeds,
      fees,
      proceeds,
      price_yes: prices.yes,
      price_no: prices.no,
      executed_at: now,
    })
  }
}

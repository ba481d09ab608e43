//! Governance - Market Creation, Votes, Aggregation and Resolution
//!
//! Vote aggregation is idempotent: the tally is recomputed from the raw
//! vote records on every run, and the transition is applied under the
//! market lock only if the market is still in the phase and round the
//! tally was computed for. Running it twice, or concurrently, yields at
//! most one transition.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::engine::MarketEngine;
use super::events::EngineEvent;
use crate::domain::error::MarketError;
use crate::domain::market::{Market, MarketParams, MarketState};
use crate::domain::settlement::SettlementSnapshot;
use crate::domain::trade::{ContentHash, MarketId, Outcome};
use crate::domain::vote::{Tally, VotePhase, VoteRecord};
use crate::ports::{MarketRepository, VoteStore};

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome {
  /// The market is not collecting votes (or moved on meanwhile).
  NotApplicable { state: MarketState },
  /// Votes still being collected: no state change.
  Unchanged { tally: Tally },
  /// The tally drove a state transition.
  Transitioned {
    from: MarketState,
    to: MarketState,
    tally: Tally,
  },
}

impl<R: MarketRepository, V: VoteStore> MarketEngine<R, V> {
  /// Create a market with a generated id.
  pub async fn create_market(
    &self,
    creator: &str,
    params: MarketParams,
  ) -> Result<MarketId, MarketError> {
    let market_id = Uuid::new_v4().to_string();
    self.create_market_with_id(&market_id, creator, params).await?;
    Ok(market_id)
  }

  /// Create a market under a caller-chosen id.
  #[instrument(skip(self, params))]
  pub async fn create_market_with_id(
    &self,
    market_id: &str,
    creator: &str,
    params: MarketParams,
  ) -> Result<Market, MarketError> {
    let config = self.config();
    if config.global_pause {
      return Err(MarketError::MarketPaused);
    }
    if params.liquidity < config.min_liquidity || params.liquidity > config.max_liquidity {
      return Err(MarketError::InvalidParameter(format!(
        "liquidity {} outside [{}, {}]",
        params.liquidity, config.min_liquidity, config.max_liquidity
      )));
    }

    let _guard = self.locks.acquire(market_id).await;
    if self.repo.load_market(market_id).await?.is_some() {
      return Err(MarketError::MarketExists(market_id.to_string()));
    }

    let now = self.clock.now();
    let mut market = Market::new(
      market_id.to_string(),
      creator.to_string(),
      params,
      config.share_floor,
      now,
    )?;
    self.persist(&mut market, &mut []).await?;

    info!(
      liquidity = %market.liquidity(),
      backing = %market.backer_liquidity(),
      question = %market.question_hash,
      "Market proposed"
    );
    self.emit(EngineEvent::MarketCreated {
      market_id: market.id.clone(),
      creator: market.creator.clone(),
      liquidity: market.liquidity(),
      at: now,
    });
    Ok(market)
  }

  /// Open an approved market for trading (creator or admin).
  #[instrument(skip(self))]
  pub async fn activate(&self, actor: &str, market_id: &str) -> Result<(), MarketError> {
    let config = self.config();
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    if actor != market.creator && !config.roles.is_admin(actor) {
      return Err(MarketError::Unauthorized {
        actor: actor.to_string(),
        action: "activate market",
      });
    }
    let from = market.state();
    market.activate(self.clock.now())?;
    self.persist(&mut market, &mut []).await?;

    info!("Market activated");
    self.emit_transition(market_id, from, market.state());
    Ok(())
  }

  /// Record a signed vote for the market's current phase and round.
  #[instrument(skip(self, vote), fields(market_id = %vote.ballot.market_id, voter = %vote.ballot.voter))]
  pub async fn submit_vote(&self, vote: VoteRecord) -> Result<VoteRecord, MarketError> {
    let ballot = &vote.ballot;
    let market = self.market(&ballot.market_id).await?;

    if market.state().vote_phase() != Some(ballot.phase) {
      return Err(MarketError::InvalidState {
        state: market.state(),
        operation: "vote",
      });
    }
    if ballot.choice.phase() != ballot.phase {
      return Err(MarketError::InvalidParameter(format!(
        "{} is not a {} vote",
        ballot.choice, ballot.phase
      )));
    }
    if ballot.phase == VotePhase::Dispute {
      let period = self.config().dispute_voting_period();
      if let Some(closes_at) = market.dispute_voting_closes_at(period)? {
        if self.clock.now() >= closes_at {
          return Err(MarketError::InvalidState {
            state: market.state(),
            operation: "vote after dispute voting closed",
          });
        }
      }
    }
    let round = market.vote_round(ballot.phase);
    if ballot.round != round {
      return Err(MarketError::InvalidParameter(format!(
        "vote for round {} but round {round} is open",
        ballot.round
      )));
    }
    if !self.is_authentic(&vote) {
      warn!("Vote attribution failed");
      return Err(MarketError::InvalidSignature {
        voter: ballot.voter.clone(),
      });
    }

    let stored = self.votes.append(vote).await?;
    debug!(sequence = stored.sequence, choice = %stored.ballot.choice, "Vote recorded");
    self.emit(EngineEvent::VoteRecorded {
      market_id: stored.ballot.market_id.clone(),
      voter: stored.ballot.voter.clone(),
      phase: stored.ballot.phase,
      round: stored.ballot.round,
      sequence: stored.sequence,
      at: self.clock.now(),
    });
    Ok(stored)
  }

  fn is_authentic(&self, vote: &VoteRecord) -> bool {
    self
      .identity
      .attribution_key(&vote.ballot.voter)
      .is_some_and(|key| vote.verify(&key))
  }

  /// Recompute the tally for the market's open phase and apply it.
  ///
  /// Returns `Err(QuorumNotMet)` when too few votes were counted; nothing
  /// changes in that case. A dispute is settled early only when it is
  /// upheld; otherwise it waits for its voting period to close.
  #[instrument(skip(self))]
  pub async fn trigger_aggregation(&self, market_id: &str) -> Result<AggregationOutcome, MarketError> {
    let observed = self.market(market_id).await?;
    let Some(phase) = observed.state().vote_phase() else {
      return Ok(AggregationOutcome::NotApplicable {
        state: observed.state(),
      });
    };
    let round = observed.vote_round(phase);

    let records = self.votes.votes_for(market_id, phase, round).await?;
    let tally = Tally::count(market_id, phase, round, &records, |v| self.is_authentic(v));

    let config = self.config();
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    if market.state() != observed.state() || market.vote_round(phase) != round {
      debug!(state = %market.state(), "Market moved on since tally: skipping");
      return Ok(AggregationOutcome::NotApplicable {
        state: market.state(),
      });
    }

    let from = market.state();
    let now = self.clock.now();
    let verdict = match phase {
      VotePhase::Proposal => market.apply_proposal_tally(tally, &config.proposal, now)?,
      VotePhase::Dispute => {
        market.apply_dispute_tally(tally, &config.dispute, now, config.dispute_voting_period())?
      }
    };
    self.emit(EngineEvent::TallyComputed {
      market_id: market_id.to_string(),
      tally,
      verdict,
      at: now,
    });

    if market.state() == from {
      info!(
        phase = %phase,
        affirmative = tally.affirmative,
        negative = tally.negative,
        ratio_bps = tally.ratio_bps(),
        "Below threshold: still collecting votes"
      );
      return Ok(AggregationOutcome::Unchanged { tally });
    }

    self.settle_if_finalized(&mut market).await?;
    self.persist(&mut market, &mut []).await?;

    let to = market.state();
    info!(
      phase = %phase,
      round,
      affirmative = tally.affirmative,
      negative = tally.negative,
      from = %from,
      to = %to,
      "Aggregation applied"
    );
    self.emit_transition(market_id, from, to);
    Ok(AggregationOutcome::Transitioned { from, to, tally })
  }

  /// Freeze the settlement basis right after finalization.
  async fn settle_if_finalized(&self, market: &mut Market) -> Result<(), MarketError> {
    if market.state() != MarketState::Finalized || market.settlement().is_some() {
      return Ok(());
    }
    let positions = self.repo.positions_for_market(&market.id).await?;
    let snapshot = SettlementSnapshot::capture(market, &positions, self.clock.now())?;
    info!(
      outcome = %snapshot.outcome,
      obligations = %snapshot.obligations(),
      positions = positions.len(),
      "Settlement captured"
    );
    market.install_settlement(snapshot)
  }

  /// Close trading on an expired market.
  #[instrument(skip(self))]
  pub async fn expire(&self, market_id: &str) -> Result<(), MarketError> {
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let from = market.state();
    market.expire(self.clock.now())?;
    self.persist(&mut market, &mut []).await?;

    info!("Market expired: awaiting resolution");
    self.emit_transition(market_id, from, market.state());
    Ok(())
  }

  /// Propose the outcome of a market (resolvers only).
  #[instrument(skip(self))]
  pub async fn propose_resolution(
    &self,
    resolver: &str,
    market_id: &str,
    outcome: Outcome,
    evidence: ContentHash,
  ) -> Result<(), MarketError> {
    let config = self.config();
    if !config.roles.is_resolver(resolver) {
      return Err(MarketError::Unauthorized {
        actor: resolver.to_string(),
        action: "propose a resolution",
      });
    }

    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let from = market.state();
    let now = self.clock.now();
    market.propose_resolution(
      resolver.to_string(),
      outcome,
      evidence,
      now,
      config.min_resolution_delay(),
    )?;
    self.persist(&mut market, &mut []).await?;

    info!(outcome = %outcome, evidence = %evidence, "Resolution proposed");
    self.emit_transition(market_id, from, market.state());
    self.emit(EngineEvent::ResolutionProposed {
      market_id: market_id.to_string(),
      resolver: resolver.to_string(),
      outcome,
      at: now,
    });
    Ok(())
  }

  /// Dispute the proposed resolution (position holders only).
  #[instrument(skip(self))]
  pub async fn open_dispute(&self, initiator: &str, market_id: &str) -> Result<(), MarketError> {
    let config = self.config();
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;

    let holds = self
      .repo
      .load_position(market_id, initiator)
      .await?
      .is_some_and(|p| p.has_shares());
    if !holds {
      return Err(MarketError::NotHolder {
        trader: initiator.to_string(),
      });
    }

    let from = market.state();
    market.open_dispute(initiator.to_string(), self.clock.now(), config.dispute_window())?;
    self.persist(&mut market, &mut []).await?;

    info!(round = market.dispute_round(), "Dispute opened");
    self.emit_transition(market_id, from, market.state());
    Ok(())
  }

  /// Finalize an undisputed resolution once the dispute window has closed.
  #[instrument(skip(self))]
  pub async fn finalize(&self, market_id: &str) -> Result<Outcome, MarketError> {
    let config = self.config();
    let _guard = self.locks.acquire(market_id).await;
    let mut market = self.load_for_update(market_id).await?;
    let from = market.state();
    let outcome = market.finalize(self.clock.now(), config.dispute_window())?;
    self.settle_if_finalized(&mut market).await?;
    self.persist(&mut market, &mut []).await?;

    info!(outcome = %outcome, "Market finalized");
    self.emit_transition(market_id, from, market.state());
    Ok(outcome)
  }
}

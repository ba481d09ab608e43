//! Market aggregate and lifecycle state machine.
//!
//! ```text
//! PROPOSED ──approve──▶ APPROVED ──activate──▶ ACTIVE ──expire/propose──▶ RESOLVING
//!    │                     │                                               │    ▲
//!    └──────cancel─────────┴──▶ CANCELLED                    dispute ──────┘    │ overturn
//!                                                                       ▼       │
//!                                           FINALIZED ◀──uphold/no dispute── DISPUTED
//! ```
//!
//! Every mutating method validates first and writes last: on `Err` the
//! market is unchanged. Callers work on a loaded copy and commit it
//! through the repository only after all checks pass.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ArithmeticError, MarketError};
use super::fees::FeeBreakdown;
use super::fixed_point::Fixed;
use super::lmsr::LmsrModel;
use super::settlement::SettlementSnapshot;
use super::trade::{ContentHash, MarketId, Outcome, PriceQuote, Side, TraderId};
use super::vote::{PhaseRule, Tally, VotePhase, Verdict};

/// Slack allowed on the bounded-loss check, relative to `b` (1e-7).
const LOSS_TOLERANCE_PER_B: Fixed = Fixed::from_raw(100);

/// Absolute slack on the bounded-loss check.
const LOSS_TOLERANCE_FLAT: Fixed = Fixed::from_raw(1_000);

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketState {
    Proposed,
    Approved,
    Active,
    Resolving,
    Disputed,
    Finalized,
    Cancelled,
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proposed => "PROPOSED",
            Self::Approved => "APPROVED",
            Self::Active => "ACTIVE",
            Self::Resolving => "RESOLVING",
            Self::Disputed => "DISPUTED",
            Self::Finalized => "FINALIZED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

impl MarketState {
    /// The allowed-transition table.
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Proposed, Self::Approved | Self::Cancelled)
                | (Self::Approved, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Resolving)
                | (Self::Resolving, Self::Disputed | Self::Finalized)
                | (Self::Disputed, Self::Resolving | Self::Finalized)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled)
    }

    /// Vote phase collected in this state, if any.
    pub const fn vote_phase(self) -> Option<VotePhase> {
        match self {
            Self::Proposed => Some(VotePhase::Proposal),
            Self::Disputed => Some(VotePhase::Dispute),
            _ => None,
        }
    }

    pub const fn all() -> [Self; 7] {
        [
            Self::Proposed,
            Self::Approved,
            Self::Active,
            Self::Resolving,
            Self::Disputed,
            Self::Finalized,
            Self::Cancelled,
        ]
    }
}

/// Creation parameters supplied by the market creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Hash of the question text.
    pub question_hash: ContentHash,
    /// LMSR liquidity parameter `b`.
    pub liquidity: Fixed,
    /// Funds the creator locks to back the curve; at least `b · ln 2`.
    pub backer_liquidity: Fixed,
    /// Trading stops and resolution opens at this instant.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Timestamp per lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub resolving_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Outcome proposed by a resolver, open to dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolver: TraderId,
    pub outcome: Outcome,
    pub evidence: ContentHash,
    pub proposed_at: DateTime<Utc>,
}

/// A dispute against the current resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub initiator: TraderId,
    pub opened_at: DateTime<Utc>,
    pub round: u32,
}

/// A binary LMSR market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub creator: TraderId,
    pub question_hash: ContentHash,
    pub expires_at: Option<DateTime<Utc>>,

    model: LmsrModel,
    share_floor: Fixed,
    q_yes: Fixed,
    q_no: Fixed,

    /// Creator-supplied backing funds.
    backer_liquidity: Fixed,
    /// Net curve cash: Σ buy costs − Σ sell proceeds (fees excluded).
    net_collected: Fixed,
    /// Fees accrued over the market's life.
    fees: FeeBreakdown,
    total_volume: Fixed,
    trade_count: u64,
    /// Sum of payouts already claimed.
    claimed_total: Fixed,

    state: MarketState,
    paused: bool,
    timestamps: Timestamps,
    resolution: Option<Resolution>,
    dispute: Option<Dispute>,
    dispute_round: u32,
    final_outcome: Option<Outcome>,
    last_tally: Option<Tally>,
    settlement: Option<SettlementSnapshot>,
    liquidity_withdrawn: bool,

    version: u64,
}

impl Market {
    /// A new market in `PROPOSED` with both quantities at the share floor.
    pub fn new(
        id: MarketId,
        creator: TraderId,
        params: MarketParams,
        share_floor: Fixed,
        now: DateTime<Utc>,
    ) -> Result<Self, MarketError> {
        let model = LmsrModel::new(params.liquidity)?;
        if !share_floor.is_positive() {
            return Err(MarketError::InvalidParameter(format!(
                "share floor must be positive, got {share_floor}"
            )));
        }
        let max_loss = model.max_loss()?;
        if params.backer_liquidity < max_loss {
            return Err(MarketError::InvalidParameter(format!(
                "backer liquidity {} below maximum loss {max_loss}",
                params.backer_liquidity
            )));
        }
        if let Some(expiry) = params.expires_at {
            if expiry <= now {
                return Err(MarketError::InvalidParameter("expiry must be in the future".into()));
            }
        }
        // both quantities at the floor must stay inside the exp domain
        model.cost(share_floor, share_floor)?;

        Ok(Self {
            id,
            creator,
            question_hash: params.question_hash,
            expires_at: params.expires_at,
            model,
            share_floor,
            q_yes: share_floor,
            q_no: share_floor,
            backer_liquidity: params.backer_liquidity,
            net_collected: Fixed::ZERO,
            fees: FeeBreakdown::default(),
            total_volume: Fixed::ZERO,
            trade_count: 0,
            claimed_total: Fixed::ZERO,
            state: MarketState::Proposed,
            paused: false,
            timestamps: Timestamps {
                created_at: now,
                approved_at: None,
                activated_at: None,
                resolving_at: None,
                disputed_at: None,
                finalized_at: None,
                cancelled_at: None,
                last_trade_at: None,
            },
            resolution: None,
            dispute: None,
            dispute_round: 0,
            final_outcome: None,
            last_tally: None,
            settlement: None,
            liquidity_withdrawn: false,
            version: 0,
        })
    }

    // ── Accessors ──

    pub const fn model(&self) -> &LmsrModel {
        &self.model
    }

    pub const fn liquidity(&self) -> Fixed {
        self.model.liquidity()
    }

    pub const fn share_floor(&self) -> Fixed {
        self.share_floor
    }

    pub const fn q_yes(&self) -> Fixed {
        self.q_yes
    }

    pub const fn q_no(&self) -> Fixed {
        self.q_no
    }

    pub const fn quantity(&self, side: Side) -> Fixed {
        match side {
            Side::Yes => self.q_yes,
            Side::No => self.q_no,
        }
    }

    pub const fn backer_liquidity(&self) -> Fixed {
        self.backer_liquidity
    }

    pub const fn net_collected(&self) -> Fixed {
        self.net_collected
    }

    pub const fn fees(&self) -> &FeeBreakdown {
        &self.fees
    }

    pub const fn total_volume(&self) -> Fixed {
        self.total_volume
    }

    pub const fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub const fn claimed_total(&self) -> Fixed {
        self.claimed_total
    }

    pub const fn state(&self) -> MarketState {
        self.state
    }

    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    pub const fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    pub const fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub const fn dispute(&self) -> Option<&Dispute> {
        self.dispute.as_ref()
    }

    pub const fn dispute_round(&self) -> u32 {
        self.dispute_round
    }

    pub const fn final_outcome(&self) -> Option<Outcome> {
        self.final_outcome
    }

    pub const fn last_tally(&self) -> Option<&Tally> {
        self.last_tally.as_ref()
    }

    pub const fn settlement(&self) -> Option<&SettlementSnapshot> {
        self.settlement.as_ref()
    }

    pub const fn liquidity_withdrawn(&self) -> bool {
        self.liquidity_withdrawn
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Advances the record version ahead of a commit.
    pub const fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Round of the votes currently being collected for `phase`.
    pub const fn vote_round(&self, phase: VotePhase) -> u32 {
        match phase {
            VotePhase::Proposal => 0,
            VotePhase::Dispute => self.dispute_round,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    // ── Pricing and accounting views ──

    pub fn prices(&self) -> Result<PriceQuote, MarketError> {
        let (yes, no) = self.model.prices(self.q_yes, self.q_no)?;
        Ok(PriceQuote { yes, no })
    }

    /// Shares in trader hands on `side` (quantity above the floor).
    pub fn outstanding(&self, side: Side) -> Result<Fixed, ArithmeticError> {
        self.quantity(side).checked_sub(self.share_floor)
    }

    /// Worst-case subsidy the backer would pay if the market resolved now:
    /// `max_side(outstanding − net_collected)`, floored at zero.
    pub fn worst_case_loss(&self) -> Result<Fixed, ArithmeticError> {
        let yes = self.outstanding(Side::Yes)?.checked_sub(self.net_collected)?;
        let no = self.outstanding(Side::No)?.checked_sub(self.net_collected)?;
        Ok(yes.max(no).max(Fixed::ZERO))
    }

    /// Verifies the accounting invariants of this market.
    pub fn check_invariants(&self) -> Result<(), MarketError> {
        let violation = |detail: String| MarketError::InvariantViolation {
            market_id: self.id.clone(),
            detail,
        };

        for side in [Side::Yes, Side::No] {
            if self.quantity(side) < self.share_floor {
                return Err(violation(format!(
                    "{side} quantity {} below floor {}",
                    self.quantity(side),
                    self.share_floor
                )));
            }
        }

        let tolerance = self
            .liquidity()
            .checked_mul(LOSS_TOLERANCE_PER_B)?
            .checked_add(LOSS_TOLERANCE_FLAT)?;
        let bound = self.model.max_loss()?.checked_add(tolerance)?;
        let loss = self.worst_case_loss()?;
        if loss > bound {
            return Err(violation(format!("worst-case loss {loss} exceeds bound {bound}")));
        }
        if self.net_collected.checked_add(tolerance)?.is_negative() {
            return Err(violation(format!("net collected {} is negative", self.net_collected)));
        }

        let fee_sum = self
            .fees
            .protocol
            .checked_add(self.fees.creator)?
            .checked_add(self.fees.liquidity)?;
        if fee_sum != self.fees.total {
            return Err(violation(format!(
                "fee components {fee_sum} differ from total {}",
                self.fees.total
            )));
        }

        if self.state == MarketState::Finalized && self.final_outcome.is_none() {
            return Err(violation("finalized without an outcome".into()));
        }
        if let Some(snapshot) = &self.settlement {
            if self.claimed_total > snapshot.obligations() {
                return Err(violation(format!(
                    "claimed {} exceeds settlement obligations {}",
                    self.claimed_total,
                    snapshot.obligations()
                )));
            }
        }
        Ok(())
    }

    // ── Transitions ──

    fn transition(&mut self, to: MarketState, now: DateTime<Utc>) -> Result<(), MarketError> {
        if !self.state.can_transition_to(to) {
            return Err(MarketError::InvalidTransition { from: self.state, to });
        }
        let slot = match to {
            MarketState::Approved => &mut self.timestamps.approved_at,
            MarketState::Active => &mut self.timestamps.activated_at,
            MarketState::Resolving => &mut self.timestamps.resolving_at,
            MarketState::Disputed => &mut self.timestamps.disputed_at,
            MarketState::Finalized => &mut self.timestamps.finalized_at,
            MarketState::Cancelled => &mut self.timestamps.cancelled_at,
            MarketState::Proposed => {
                return Err(MarketError::InvalidTransition { from: self.state, to });
            }
        };
        *slot = Some(now);
        self.state = to;
        Ok(())
    }

    /// Applies a proposal tally. `Passed` moves the market to `APPROVED`.
    pub fn apply_proposal_tally(
        &mut self,
        tally: Tally,
        rule: &PhaseRule,
        now: DateTime<Utc>,
    ) -> Result<Verdict, MarketError> {
        if self.state != MarketState::Proposed {
            return Err(MarketError::InvalidTransition {
                from: self.state,
                to: MarketState::Approved,
            });
        }
        let verdict = rule.decide(&tally);
        match verdict {
            Verdict::BelowQuorum => {
                return Err(MarketError::QuorumNotMet {
                    votes: tally.total(),
                    quorum: rule.quorum,
                });
            }
            Verdict::BelowThreshold => {}
            Verdict::Passed => {
                self.transition(MarketState::Approved, now)?;
                self.last_tally = Some(tally);
            }
        }
        Ok(verdict)
    }

    /// When dispute voting closes, if a dispute is open.
    pub fn dispute_voting_closes_at(
        &self,
        voting_period: Duration,
    ) -> Result<Option<DateTime<Utc>>, MarketError> {
        self.dispute
            .as_ref()
            .map(|d| add_window(d.opened_at, voting_period))
            .transpose()
    }

    /// Applies a dispute tally.
    ///
    /// `Passed` (enough voters agree with the dispute) overturns the
    /// proposed resolution at once and reopens `RESOLVING` for a new
    /// proposal. Any other verdict only counts once the voting period has
    /// closed: the dispute then fails and the proposed outcome is
    /// finalized, even with no votes at all. Before that the market keeps
    /// collecting votes.
    pub fn apply_dispute_tally(
        &mut self,
        tally: Tally,
        rule: &PhaseRule,
        now: DateTime<Utc>,
        voting_period: Duration,
    ) -> Result<Verdict, MarketError> {
        if self.state != MarketState::Disputed {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "apply a dispute tally",
            });
        }
        let voting_closed = self
            .dispute_voting_closes_at(voting_period)?
            .is_some_and(|closes_at| now >= closes_at);
        let verdict = rule.decide(&tally);
        match verdict {
            Verdict::Passed => {
                self.transition(MarketState::Resolving, now)?;
                self.resolution = None;
                self.dispute = None;
                self.dispute_round = self.dispute_round.saturating_add(1);
            }
            Verdict::BelowQuorum if !voting_closed => {
                return Err(MarketError::QuorumNotMet {
                    votes: tally.total(),
                    quorum: rule.quorum,
                });
            }
            Verdict::BelowThreshold if !voting_closed => return Ok(verdict),
            Verdict::BelowQuorum | Verdict::BelowThreshold => {
                let outcome = self.proposed_outcome()?;
                self.transition(MarketState::Finalized, now)?;
                self.final_outcome = Some(outcome);
            }
        }
        self.last_tally = Some(tally);
        Ok(verdict)
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), MarketError> {
        if self.is_expired(now) {
            return Err(MarketError::InvalidParameter("market expired before activation".into()));
        }
        self.transition(MarketState::Active, now)
    }

    /// Cancels a market that never traded; returns the backing funds to refund.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Fixed, MarketError> {
        self.transition(MarketState::Cancelled, now)?;
        self.liquidity_withdrawn = true;
        Ok(self.backer_liquidity)
    }

    /// Closes trading once the expiry has passed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), MarketError> {
        if self.state != MarketState::Active {
            return Err(MarketError::InvalidTransition {
                from: self.state,
                to: MarketState::Resolving,
            });
        }
        if !self.is_expired(now) {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "expire before the expiry time",
            });
        }
        self.transition(MarketState::Resolving, now)
    }

    /// Records a resolver's proposed outcome.
    ///
    /// From `ACTIVE` this also closes trading, provided the market has
    /// expired or `min_delay` has elapsed since activation.
    pub fn propose_resolution(
        &mut self,
        resolver: TraderId,
        outcome: Outcome,
        evidence: ContentHash,
        now: DateTime<Utc>,
        min_delay: Duration,
    ) -> Result<(), MarketError> {
        match self.state {
            MarketState::Active => {
                let activated = self.timestamps.activated_at.unwrap_or(self.timestamps.created_at);
                let earliest = add_window(activated, min_delay)?;
                if !self.is_expired(now) && now < earliest {
                    return Err(MarketError::InvalidState {
                        state: self.state,
                        operation: "resolve before the minimum resolution delay",
                    });
                }
                self.transition(MarketState::Resolving, now)?;
            }
            MarketState::Resolving if self.resolution.is_none() => {}
            MarketState::Resolving => {
                return Err(MarketError::InvalidState {
                    state: self.state,
                    operation: "propose a second resolution",
                });
            }
            state => {
                return Err(MarketError::InvalidState {
                    state,
                    operation: "propose a resolution",
                });
            }
        }
        self.resolution = Some(Resolution {
            resolver,
            outcome,
            evidence,
            proposed_at: now,
        });
        Ok(())
    }

    /// Opens a dispute against the proposed resolution.
    pub fn open_dispute(
        &mut self,
        initiator: TraderId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), MarketError> {
        if self.state == MarketState::Disputed || self.dispute.is_some() {
            return Err(MarketError::AlreadyDisputed);
        }
        if self.state != MarketState::Resolving {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "dispute",
            });
        }
        let Some(resolution) = &self.resolution else {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "dispute before a resolution is proposed",
            });
        };
        let closes_at = add_window(resolution.proposed_at, window)?;
        if now >= closes_at {
            return Err(MarketError::DisputeWindowClosed { closed_at: closes_at });
        }
        self.transition(MarketState::Disputed, now)?;
        self.dispute = Some(Dispute {
            initiator,
            opened_at: now,
            round: self.dispute_round,
        });
        Ok(())
    }

    /// Finalizes an undisputed resolution after the dispute window.
    pub fn finalize(&mut self, now: DateTime<Utc>, window: Duration) -> Result<Outcome, MarketError> {
        if self.state != MarketState::Resolving {
            return Err(MarketError::InvalidTransition {
                from: self.state,
                to: MarketState::Finalized,
            });
        }
        let Some(resolution) = &self.resolution else {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "finalize without a proposed resolution",
            });
        };
        let closes_at = add_window(resolution.proposed_at, window)?;
        if now < closes_at {
            return Err(MarketError::DisputeWindowOpen { closes_at });
        }
        let outcome = resolution.outcome;
        self.transition(MarketState::Finalized, now)?;
        self.final_outcome = Some(outcome);
        Ok(outcome)
    }

    fn proposed_outcome(&self) -> Result<Outcome, MarketError> {
        self.resolution
            .as_ref()
            .map(|r| r.outcome)
            .ok_or_else(|| MarketError::InvariantViolation {
                market_id: self.id.clone(),
                detail: "dispute without a proposed resolution".into(),
            })
    }

    /// Freezes the payout basis; set once, right after finalization.
    pub fn install_settlement(&mut self, snapshot: SettlementSnapshot) -> Result<(), MarketError> {
        if self.state != MarketState::Finalized || self.settlement.is_some() {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "install settlement",
            });
        }
        self.settlement = Some(snapshot);
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<(), MarketError> {
        if self.state.is_terminal() {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "pause",
            });
        }
        self.paused = paused;
        Ok(())
    }

    // ── Trading ──

    /// Checks that a trade may execute now.
    pub fn ensure_tradable(&self, global_pause: bool, now: DateTime<Utc>) -> Result<(), MarketError> {
        if self.state != MarketState::Active {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "trade",
            });
        }
        if self.is_expired(now) {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "trade after expiry",
            });
        }
        if self.paused || global_pause {
            return Err(MarketError::MarketPaused);
        }
        Ok(())
    }

    /// Books a buy of `shares` on `side`.
    pub fn apply_buy(
        &mut self,
        side: Side,
        shares: Fixed,
        curve_cost: Fixed,
        fees: &FeeBreakdown,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        let quantity = self.quantity(side).checked_add(shares)?;
        let net_collected = self.net_collected.checked_add(curve_cost)?;
        let accrued = self.fees.accumulate(fees)?;
        let volume = self.total_volume.checked_add(curve_cost)?;

        self.set_quantity(side, quantity);
        self.net_collected = net_collected;
        self.fees = accrued;
        self.total_volume = volume;
        self.trade_count += 1;
        self.timestamps.last_trade_at = Some(now);
        Ok(())
    }

    /// Books a sell of `shares` on `side`. Never crosses the floor.
    pub fn apply_sell(
        &mut self,
        side: Side,
        shares: Fixed,
        gross_proceeds: Fixed,
        fees: &FeeBreakdown,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        let quantity = self.quantity(side).checked_sub(shares)?;
        if quantity < self.share_floor {
            return Err(MarketError::MarketFloorViolation {
                side,
                floor: self.share_floor,
                attempted: shares,
            });
        }
        let net_collected = self.net_collected.checked_sub(gross_proceeds)?;
        let accrued = self.fees.accumulate(fees)?;
        let volume = self.total_volume.checked_add(gross_proceeds)?;

        self.set_quantity(side, quantity);
        self.net_collected = net_collected;
        self.fees = accrued;
        self.total_volume = volume;
        self.trade_count += 1;
        self.timestamps.last_trade_at = Some(now);
        Ok(())
    }

    fn set_quantity(&mut self, side: Side, quantity: Fixed) {
        match side {
            Side::Yes => self.q_yes = quantity,
            Side::No => self.q_no = quantity,
        }
    }

    // ── Settlement bookkeeping ──

    /// Adds a paid claim to the running total.
    pub fn record_claim(&mut self, payout: Fixed) -> Result<(), MarketError> {
        let Some(snapshot) = &self.settlement else {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "claim before settlement",
            });
        };
        let claimed = self.claimed_total.checked_add(payout)?;
        if claimed > snapshot.obligations() {
            return Err(MarketError::InvariantViolation {
                market_id: self.id.clone(),
                detail: format!("claims {claimed} would exceed obligations {}", snapshot.obligations()),
            });
        }
        self.claimed_total = claimed;
        Ok(())
    }

    /// Marks the creator's liquidity as returned. One-shot.
    pub fn mark_liquidity_withdrawn(&mut self) -> Result<(), MarketError> {
        if self.state != MarketState::Finalized || self.settlement.is_none() {
            return Err(MarketError::InvalidState {
                state: self.state,
                operation: "withdraw liquidity",
            });
        }
        if self.liquidity_withdrawn {
            return Err(MarketError::AlreadyClaimed);
        }
        self.liquidity_withdrawn = true;
        Ok(())
    }
}

fn add_window(start: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>, MarketError> {
    start
        .checked_add_signed(window)
        .ok_or_else(|| MarketError::InvalidParameter(format!("time window {window} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::FeeSchedule;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fx(value: rust_decimal::Decimal) -> Fixed {
        Fixed::from_decimal(value).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn market() -> Market {
        Market::new(
            "m1".into(),
            "creator".into(),
            MarketParams {
                question_hash: ContentHash::of(b"q"),
                liquidity: fx(dec!(100)),
                backer_liquidity: fx(dec!(70)),
                expires_at: Some(t0() + Duration::days(7)),
            },
            fx(dec!(0.1)),
            t0(),
        )
        .unwrap()
    }

    fn tally(phase: VotePhase, affirmative: u64, negative: u64) -> Tally {
        Tally {
            phase,
            round: 0,
            affirmative,
            negative,
            ignored: 0,
        }
    }

    const RULE: PhaseRule = PhaseRule { threshold_bps: 7_000, quorum: 10 };

    fn active_market() -> Market {
        let mut m = market();
        m.apply_proposal_tally(tally(VotePhase::Proposal, 7, 3), &RULE, t0()).unwrap();
        m.activate(t0()).unwrap();
        m
    }

    #[test]
    fn test_transition_table() {
        use MarketState::*;
        let allowed = [
            (Proposed, Approved),
            (Proposed, Cancelled),
            (Approved, Active),
            (Approved, Cancelled),
            (Active, Resolving),
            (Resolving, Disputed),
            (Resolving, Finalized),
            (Disputed, Resolving),
            (Disputed, Finalized),
        ];
        for from in MarketState::all() {
            for to in MarketState::all() {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_new_market_starts_at_floor() {
        let m = market();
        assert_eq!(m.state(), MarketState::Proposed);
        assert_eq!(m.q_yes(), fx(dec!(0.1)));
        assert_eq!(m.q_no(), fx(dec!(0.1)));
        assert_eq!(m.prices().unwrap().yes, fx(dec!(0.5)));
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_new_market_requires_backing_for_max_loss() {
        let err = Market::new(
            "m1".into(),
            "creator".into(),
            MarketParams {
                question_hash: ContentHash::default(),
                liquidity: fx(dec!(100)),
                backer_liquidity: fx(dec!(69)),
                expires_at: None,
            },
            fx(dec!(0.1)),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::InvalidParameter(_)));
    }

    #[test]
    fn test_proposal_below_threshold_stays_proposed() {
        let mut m = market();
        let verdict = m
            .apply_proposal_tally(tally(VotePhase::Proposal, 6, 4), &RULE, t0())
            .unwrap();
        assert_eq!(verdict, Verdict::BelowThreshold);
        assert_eq!(m.state(), MarketState::Proposed);
    }

    #[test]
    fn test_proposal_below_quorum_is_an_error_without_change() {
        let mut m = market();
        let before = m.clone();
        let err = m
            .apply_proposal_tally(tally(VotePhase::Proposal, 5, 0), &RULE, t0())
            .unwrap_err();
        assert!(matches!(err, MarketError::QuorumNotMet { votes: 5, quorum: 10 }));
        assert_eq!(m, before);
    }

    #[test]
    fn test_trading_requires_active_and_unpaused() {
        let mut m = market();
        assert!(matches!(
            m.ensure_tradable(false, t0()),
            Err(MarketError::InvalidState { .. })
        ));
        m = active_market();
        assert!(m.ensure_tradable(false, t0()).is_ok());
        assert!(matches!(m.ensure_tradable(true, t0()), Err(MarketError::MarketPaused)));
        m.set_paused(true).unwrap();
        assert!(matches!(m.ensure_tradable(false, t0()), Err(MarketError::MarketPaused)));
    }

    #[test]
    fn test_buy_then_sell_books_accounting() {
        let mut m = active_market();
        let (shares, cost) = m
            .model()
            .quote_buy(m.q_yes(), m.q_no(), Side::Yes, fx(dec!(10)))
            .unwrap();
        let fees = FeeSchedule::default().split(cost).unwrap();
        m.apply_buy(Side::Yes, shares, cost, &fees, t0()).unwrap();
        assert_eq!(m.net_collected(), cost);
        assert_eq!(m.trade_count(), 1);
        assert!(m.check_invariants().is_ok());

        let proceeds = m
            .model()
            .proceeds_from_sell(m.q_yes(), m.q_no(), Side::Yes, shares, m.share_floor())
            .unwrap();
        let sell_fees = FeeSchedule::default().split(proceeds).unwrap();
        m.apply_sell(Side::Yes, shares, proceeds, &sell_fees, t0()).unwrap();
        assert_eq!(m.q_yes(), m.share_floor());
        assert_eq!(m.net_collected(), Fixed::ZERO);
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_sell_below_floor_leaves_market_untouched() {
        let mut m = active_market();
        let before = m.clone();
        let err = m
            .apply_sell(Side::No, fx(dec!(0.2)), Fixed::ZERO, &FeeBreakdown::default(), t0())
            .unwrap_err();
        assert!(matches!(err, MarketError::MarketFloorViolation { .. }));
        assert_eq!(m, before);
    }

    #[test]
    fn test_resolution_dispute_and_overturn() {
        let mut m = active_market();
        let now = t0() + Duration::days(8);
        m.expire(now).unwrap();
        assert_eq!(m.state(), MarketState::Resolving);

        m.propose_resolution("oracle".into(), Outcome::Yes, ContentHash::of(b"e"), now, Duration::zero())
            .unwrap();
        assert!(matches!(
            m.finalize(now, Duration::hours(48)),
            Err(MarketError::DisputeWindowOpen { .. })
        ));

        m.open_dispute("holder".into(), now + Duration::hours(1), Duration::hours(48))
            .unwrap();
        assert_eq!(m.state(), MarketState::Disputed);
        assert!(matches!(
            m.open_dispute("holder".into(), now, Duration::hours(48)),
            Err(MarketError::AlreadyDisputed)
        ));

        let rule = PhaseRule { threshold_bps: 6_000, quorum: 3 };
        let verdict = m
            .apply_dispute_tally(tally(VotePhase::Dispute, 3, 1), &rule, now, Duration::days(3))
            .unwrap();
        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(m.state(), MarketState::Resolving);
        assert!(m.resolution().is_none());
        assert_eq!(m.dispute_round(), 1);
        assert_eq!(m.vote_round(VotePhase::Dispute), 1);
    }

    #[test]
    fn test_rejected_dispute_finalizes_proposed_outcome() {
        let mut m = active_market();
        let now = t0() + Duration::days(8);
        m.propose_resolution("oracle".into(), Outcome::No, ContentHash::default(), now, Duration::zero())
            .unwrap();
        m.open_dispute("holder".into(), now, Duration::hours(48)).unwrap();
        let rule = PhaseRule { threshold_bps: 6_000, quorum: 3 };
        let period = Duration::days(3);

        let verdict = m
            .apply_dispute_tally(tally(VotePhase::Dispute, 1, 2), &rule, now, period)
            .unwrap();
        assert_eq!(verdict, Verdict::BelowThreshold);
        assert_eq!(m.state(), MarketState::Disputed);
        assert!(m.last_tally().is_some_and(|t| t.phase == VotePhase::Proposal));

        let closed = now + period;
        assert_eq!(m.dispute_voting_closes_at(period).unwrap(), Some(closed));
        m.apply_dispute_tally(tally(VotePhase::Dispute, 1, 2), &rule, closed, period)
            .unwrap();
        assert_eq!(m.state(), MarketState::Finalized);
        assert_eq!(m.final_outcome(), Some(Outcome::No));
    }

    #[test]
    fn test_unvoted_dispute_fails_when_voting_closes() {
        let mut m = active_market();
        let now = t0() + Duration::days(8);
        m.propose_resolution("oracle".into(), Outcome::Yes, ContentHash::default(), now, Duration::zero())
            .unwrap();
        m.open_dispute("holder".into(), now, Duration::hours(48)).unwrap();
        let rule = PhaseRule { threshold_bps: 6_000, quorum: 5 };
        let period = Duration::days(3);

        let err = m
            .apply_dispute_tally(tally(VotePhase::Dispute, 0, 0), &rule, now + Duration::days(1), period)
            .unwrap_err();
        assert!(matches!(err, MarketError::QuorumNotMet { votes: 0, quorum: 5 }));
        assert_eq!(m.state(), MarketState::Disputed);

        let verdict = m
            .apply_dispute_tally(tally(VotePhase::Dispute, 0, 0), &rule, now + period, period)
            .unwrap();
        assert_eq!(verdict, Verdict::BelowQuorum);
        assert_eq!(m.state(), MarketState::Finalized);
        assert_eq!(m.final_outcome(), Some(Outcome::Yes));
    }

    #[test]
    fn test_dispute_after_window_rejected() {
        let mut m = active_market();
        let now = t0() + Duration::days(8);
        m.propose_resolution("oracle".into(), Outcome::Yes, ContentHash::default(), now, Duration::zero())
            .unwrap();
        let late = now + Duration::hours(48);
        assert!(matches!(
            m.open_dispute("holder".into(), late, Duration::hours(48)),
            Err(MarketError::DisputeWindowClosed { .. })
        ));
        assert_eq!(m.finalize(late, Duration::hours(48)).unwrap(), Outcome::Yes);
        assert_eq!(m.state(), MarketState::Finalized);
    }

    #[test]
    fn test_min_resolution_delay_before_expiry() {
        let mut m = active_market();
        let err = m
            .propose_resolution("oracle".into(), Outcome::Yes, ContentHash::default(), t0(), Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState { .. }));
        m.propose_resolution(
            "oracle".into(),
            Outcome::Yes,
            ContentHash::default(),
            t0() + Duration::hours(1),
            Duration::hours(1),
        )
        .unwrap();
        assert_eq!(m.state(), MarketState::Resolving);
    }

    #[test]
    fn test_cancel_only_before_activation() {
        let mut m = market();
        assert_eq!(m.cancel(t0()).unwrap(), fx(dec!(70)));
        assert_eq!(m.state(), MarketState::Cancelled);

        let mut active = active_market();
        assert!(matches!(
            active.cancel(t0()),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_expire_requires_expiry() {
        let mut m = active_market();
        assert!(m.expire(t0()).is_err());
        assert_eq!(m.state(), MarketState::Active);
    }

    #[test]
    fn test_pause_rejected_in_terminal_state() {
        let mut m = market();
        m.cancel(t0()).unwrap();
        assert!(m.set_paused(true).is_err());
    }
}

//! Governance votes and tallies.
//!
//! Votes are off-ledger records: a ballot plus an HMAC-SHA256 attribution
//! signature keyed by the voter's secret. The aggregator recomputes the
//! tally from raw records on every run, re-verifying each signature and
//! counting at most one vote per voter, so the outcome never depends on
//! the store having enforced uniqueness.
//!
//! Thresholds are compared with exact integer arithmetic:
//! `affirmative · 10000 ≥ threshold_bps · total`.

use std::collections::HashSet;
use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MarketError;
use super::fixed_point::{BPS_DENOMINATOR, Fixed};
use super::trade::{MarketId, TraderId};

/// Which governance phase a vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotePhase {
    /// Approve or reject a proposed market.
    Proposal,
    /// Agree or disagree with an open dispute.
    Dispute,
}

impl fmt::Display for VotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposal => write!(f, "proposal"),
            Self::Dispute => write!(f, "dispute"),
        }
    }
}

/// A voter's choice. `Approve`/`Reject` are proposal votes,
/// `Agree`/`Disagree` are dispute votes (agreeing with the dispute means
/// the proposed resolution should be overturned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    Approve,
    Reject,
    Agree,
    Disagree,
}

impl VoteChoice {
    pub const fn phase(self) -> VotePhase {
        match self {
            Self::Approve | Self::Reject => VotePhase::Proposal,
            Self::Agree | Self::Disagree => VotePhase::Dispute,
        }
    }

    pub const fn is_affirmative(self) -> bool {
        matches!(self, Self::Approve | Self::Agree)
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Agree => write!(f, "agree"),
            Self::Disagree => write!(f, "disagree"),
        }
    }
}

/// Unsigned vote content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub market_id: MarketId,
    pub voter: TraderId,
    pub phase: VotePhase,
    /// Dispute round (always 0 for proposal votes).
    pub round: u32,
    pub choice: VoteChoice,
    pub cast_at: DateTime<Utc>,
}

impl Ballot {
    /// Message covered by the attribution signature.
    ///
    /// Format: `vote:v1|market|phase|round|voter|choice|cast_at_unix`
    pub fn canonical_message(&self) -> String {
        format!(
            "vote:v1|{}|{}|{}|{}|{}|{}",
            self.market_id,
            self.phase,
            self.round,
            self.voter,
            self.choice,
            self.cast_at.timestamp()
        )
    }

    /// Signs the ballot with the voter's attribution key.
    pub fn sign(self, key: &[u8]) -> VoteRecord {
        let mac = hmac_sha256::HMAC::mac(self.canonical_message().as_bytes(), key);
        VoteRecord {
            signature: base64::engine::general_purpose::STANDARD.encode(mac),
            ballot: self,
            sequence: 0,
        }
    }
}

/// A signed vote as stored by the vote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub ballot: Ballot,
    /// Base64 HMAC-SHA256 over [`Ballot::canonical_message`].
    pub signature: String,
    /// Append order assigned by the store (0 until stored).
    pub sequence: u64,
}

impl VoteRecord {
    /// Verifies the attribution signature in constant time.
    pub fn verify(&self, key: &[u8]) -> bool {
        let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(&self.signature) else {
            return false;
        };
        let expected = hmac_sha256::HMAC::mac(self.ballot.canonical_message().as_bytes(), key);
        if provided.len() != expected.len() {
            return false;
        }
        provided
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Aggregated counts for one (market, phase, round).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub phase: VotePhase,
    pub round: u32,
    /// Approve (proposal) or Agree (dispute) votes.
    pub affirmative: u64,
    /// Reject (proposal) or Disagree (dispute) votes.
    pub negative: u64,
    /// Records skipped: duplicates, failed attribution, foreign phase/round.
    pub ignored: u64,
}

impl Tally {
    /// Counts `votes` for the given market/phase/round.
    ///
    /// Records are processed in store sequence order; only the first
    /// authentic vote per voter counts.
    pub fn count<F>(market_id: &str, phase: VotePhase, round: u32, votes: &[VoteRecord], is_authentic: F) -> Self
    where
        F: Fn(&VoteRecord) -> bool,
    {
        let mut ordered: Vec<&VoteRecord> = votes.iter().collect();
        ordered.sort_by_key(|v| v.sequence);

        let mut tally = Self {
            phase,
            round,
            affirmative: 0,
            negative: 0,
            ignored: 0,
        };
        let mut seen: HashSet<&str> = HashSet::new();

        for vote in ordered {
            let ballot = &vote.ballot;
            let relevant = ballot.market_id == market_id
                && ballot.phase == phase
                && ballot.round == round
                && ballot.choice.phase() == phase;
            if !relevant || seen.contains(ballot.voter.as_str()) || !is_authentic(vote) {
                tally.ignored += 1;
                continue;
            }
            seen.insert(ballot.voter.as_str());
            if ballot.choice.is_affirmative() {
                tally.affirmative += 1;
            } else {
                tally.negative += 1;
            }
        }
        tally
    }

    pub const fn total(&self) -> u64 {
        self.affirmative + self.negative
    }

    /// Affirmative share in basis points (0 when no votes).
    pub fn ratio_bps(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let bps = u128::from(self.affirmative) * u128::from(BPS_DENOMINATOR) / u128::from(total);
        u32::try_from(bps).unwrap_or(BPS_DENOMINATOR)
    }

    /// Affirmative share as a fixed-point ratio.
    pub fn ratio(&self) -> Fixed {
        let total = self.total();
        if total == 0 {
            return Fixed::ZERO;
        }
        let raw = u128::from(self.affirmative) * u128::from(Fixed::ONE.raw().unsigned_abs()) / u128::from(total);
        Fixed::from_raw(i64::try_from(raw).unwrap_or(Fixed::ONE.raw()))
    }
}

/// Decision rule for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRule {
    /// Minimum affirmative share, in basis points.
    pub threshold_bps: u16,
    /// Minimum number of counted votes.
    pub quorum: u64,
}

/// Outcome of applying a [`PhaseRule`] to a [`Tally`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    BelowQuorum,
    BelowThreshold,
    Passed,
}

impl PhaseRule {
    pub fn validate(&self) -> Result<(), MarketError> {
        if u32::from(self.threshold_bps) > BPS_DENOMINATOR {
            return Err(MarketError::InvalidParameter(format!(
                "vote threshold {} bps exceeds {BPS_DENOMINATOR}",
                self.threshold_bps
            )));
        }
        if self.quorum == 0 {
            return Err(MarketError::InvalidParameter("vote quorum must be at least 1".into()));
        }
        Ok(())
    }

    pub fn decide(&self, tally: &Tally) -> Verdict {
        if tally.total() < self.quorum {
            return Verdict::BelowQuorum;
        }
        let lhs = u128::from(tally.affirmative) * u128::from(BPS_DENOMINATOR);
        let rhs = u128::from(self.threshold_bps) * u128::from(tally.total());
        if lhs >= rhs {
            Verdict::Passed
        } else {
            Verdict::BelowThreshold
        }
    }
}

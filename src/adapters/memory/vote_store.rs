//! In-Memory Vote Store - Append-Only Governance Log
//!
//! Assigns sequence numbers in append order and rejects a second vote
//! from the same voter in the same (market, phase, round).

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::StoreError;
use crate::domain::trade::{MarketId, TraderId};
use crate::domain::vote::{VotePhase, VoteRecord};
use crate::ports::VoteStore;

type VoteKey = (MarketId, TraderId, VotePhase, u32);

#[derive(Debug, Default)]
struct Log {
    records: Vec<VoteRecord>,
    seen: HashSet<VoteKey>,
    next_sequence: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryVoteStore {
    log: RwLock<Log>,
}

impl InMemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored vote in sequence order.
    pub async fn dump(&self) -> Vec<VoteRecord> {
        self.log.read().await.records.clone()
    }

    /// Reload a dumped log; sequence numbering continues after the highest.
    pub async fn restore(&self, records: Vec<VoteRecord>) {
        let mut log = self.log.write().await;
        log.seen = records
            .iter()
            .map(|r| {
                let b = &r.ballot;
                (b.market_id.clone(), b.voter.clone(), b.phase, b.round)
            })
            .collect();
        log.next_sequence = records.iter().map(|r| r.sequence).max().unwrap_or(0);
        log.records = records;
    }
}

#[async_trait]
impl VoteStore for InMemoryVoteStore {
    async fn append(&self, mut vote: VoteRecord) -> Result<VoteRecord, StoreError> {
        let mut log = self.log.write().await;
        let b = &vote.ballot;
        let key = (b.market_id.clone(), b.voter.clone(), b.phase, b.round);
        if log.seen.contains(&key) {
            return Err(StoreError::DuplicateVote {
                market_id: b.market_id.clone(),
                voter: b.voter.clone(),
                phase: b.phase,
            });
        }
        log.next_sequence += 1;
        vote.sequence = log.next_sequence;
        log.seen.insert(key);
        log.records.push(vote.clone());
        Ok(vote)
    }

    async fn votes_for(
        &self,
        market_id: &str,
        phase: VotePhase,
        round: u32,
    ) -> Result<Vec<VoteRecord>, StoreError> {
        let log = self.log.read().await;
        Ok(log
            .records
            .iter()
            .filter(|r| {
                r.ballot.market_id == market_id && r.ballot.phase == phase && r.ballot.round == round
            })
            .cloned()
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

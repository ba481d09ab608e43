//! Shared test harness: an engine over the in-memory adapters with a
//! manual clock, twenty keyed voters and a captured event stream.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};

use prediction_market_engine::adapters::clock::ManualClock;
use prediction_market_engine::adapters::memory::{
    InMemoryMarketRepository, InMemoryVoteStore, StaticIdentity,
};
use prediction_market_engine::config::EngineConfig;
use prediction_market_engine::ports::Clock;
use prediction_market_engine::domain::{
    Ballot, ContentHash, Fixed, MarketError, MarketParams, VoteChoice, VoteRecord,
};
use prediction_market_engine::usecases::{EngineEvent, MarketEngine};

pub type Engine = MarketEngine<InMemoryMarketRepository, InMemoryVoteStore>;

pub const VOTERS: usize = 20;
pub const CREATOR: &str = "creator";
pub const ADMIN: &str = "admin";
pub const ORACLE: &str = "oracle";

pub fn voter(i: usize) -> String {
    format!("voter-{i}")
}

pub fn voter_key(i: usize) -> Vec<u8> {
    format!("key-{i}").into_bytes()
}

pub fn fx(value: Decimal) -> Fixed {
    Fixed::from_decimal(value).unwrap()
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.roles.admins.insert(ADMIN.to_string());
    config.roles.resolvers.insert(ORACLE.to_string());
    config
}

pub fn params(now: DateTime<Utc>) -> MarketParams {
    MarketParams {
        question_hash: ContentHash::of(b"Will it rain in Lisbon on 2026-01-08?"),
        liquidity: Fixed::from_int(100).unwrap(),
        backer_liquidity: Fixed::from_int(100).unwrap(),
        expires_at: Some(now + Duration::days(7)),
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub repo: Arc<InMemoryMarketRepository>,
    pub votes: Arc<InMemoryVoteStore>,
    pub clock: Arc<ManualClock>,
    pub config: Arc<watch::Sender<EngineConfig>>,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let identity = (0..VOTERS).fold(StaticIdentity::new(), |identity, i| {
            identity.with_key(&voter(i), &voter_key(i))
        });
        let repo = Arc::new(InMemoryMarketRepository::new());
        let votes = Arc::new(InMemoryVoteStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let config = Arc::new(watch::Sender::new(config));
        let (tx, events) = mpsc::unbounded_channel();
        let engine = MarketEngine::new(
            Arc::clone(&repo),
            Arc::clone(&votes),
            Arc::new(identity),
            clock.clone(),
            Arc::clone(&config),
        )
        .with_events(tx);

        Self {
            engine: Arc::new(engine),
            repo,
            votes,
            clock,
            config,
            events,
        }
    }

    /// Sign and submit a vote from voter `i` for the given round.
    pub async fn vote(
        &self,
        market_id: &str,
        i: usize,
        choice: VoteChoice,
        round: u32,
    ) -> Result<VoteRecord, MarketError> {
        let ballot = Ballot {
            market_id: market_id.to_string(),
            voter: voter(i),
            phase: choice.phase(),
            round,
            choice,
            cast_at: self.clock.now(),
        };
        self.engine.submit_vote(ballot.sign(&voter_key(i))).await
    }

    /// Voters `first..first + count` all cast `choice`.
    pub async fn votes(
        &self,
        market_id: &str,
        first: usize,
        count: usize,
        choice: VoteChoice,
        round: u32,
    ) {
        for i in first..first + count {
            self.vote(market_id, i, choice, round).await.unwrap();
        }
    }

    /// Create `market_id`, approve it with ten votes and activate it.
    pub async fn active_market(&self, market_id: &str) {
        let now = self.clock.now();
        self.engine
            .create_market_with_id(market_id, CREATOR, params(now))
            .await
            .unwrap();
        self.votes(market_id, 0, 10, VoteChoice::Approve, 0).await;
        self.engine.trigger_aggregation(market_id).await.unwrap();
        self.engine.activate(CREATOR, market_id).await.unwrap();
    }

    /// Every event emitted so far.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

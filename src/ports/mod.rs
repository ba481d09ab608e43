//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `MarketRepository`: versioned market/position records with atomic commits
//! - `VoteStore`: append-only governance vote log
//! - `IdentityProvider`: voter attribution keys
//! - `Clock`: the engine's only source of time

pub mod clock;
pub mod identity;
pub mod repository;
pub mod vote_store;

pub use clock::Clock;
pub use identity::IdentityProvider;
pub use repository::{Commit, MarketRepository};
pub use vote_store::VoteStore;

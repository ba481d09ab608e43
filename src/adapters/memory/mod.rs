//! In-Process Adapters
//!
//! Storage and identity implementations that live entirely in memory.
//! The file-backed snapshot store makes them crash-recoverable.

pub mod identity;
pub mod repository;
pub mod vote_store;

pub use identity::StaticIdentity;
pub use repository::InMemoryMarketRepository;
pub use vote_store::InMemoryVoteStore;

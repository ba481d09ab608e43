//! Identity Port - Voter Attribution Keys
//!
//! Authentication happens outside the engine; this port only hands out
//! the per-voter secret used to verify vote attribution signatures.

/// Supplies attribution keys for verified participants.
pub trait IdentityProvider: Send + Sync + 'static {
  /// HMAC key for `voter`, or `None` if the voter is unknown.
  fn attribution_key(&self, voter: &str) -> Option<Vec<u8>>;
}

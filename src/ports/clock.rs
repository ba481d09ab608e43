//! Clock Port - Time Source
//!
//! Every timestamp the engine records or compares comes from a `Clock`,
//! so tests can drive expiry and dispute windows deterministically.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
  /// Current instant.
  fn now(&self) -> DateTime<Utc>;
}

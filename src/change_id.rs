//! Position of a change in a subscription's logical stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-subscription change sequence number. Successive changes differ by exactly one.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangeId(u64);

impl ChangeId {
  pub const fn new(value: u64) -> Self {
    Self(value)
  }

  pub const fn as_u64(&self) -> u64 {
    self.0
  }

  /// The id the change following this one must carry.
  pub fn next(&self) -> Self {
    Self(self.0.wrapping_add(1))
  }
}

impl fmt::Display for ChangeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<u64> for ChangeId {
  fn from(value: u64) -> Self {
    Self::new(value)
  }
}

impl From<ChangeId> for u64 {
  fn from(id: ChangeId) -> Self {
    id.0
  }
}

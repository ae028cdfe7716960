//! Identifiers shared across the collaborator boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a collateralized debt position.
///
/// Allocated sequentially by the ledger and never reused once the position
/// is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl PositionId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for PositionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cdp#{}", self.0)
    }
}

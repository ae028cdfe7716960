//! Rebasing collateral asset.
//!
//! Collateral is held as shares of a liquid-staking token. The index is the
//! amount of underlying per share (18 decimals) and grows as staking rewards
//! accrue.

use alloy::primitives::U256;
use parking_lot::RwLock;
use std::fmt::Debug;

/// One unit of index (1.0 underlying per share).
pub const INDEX_ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Exchange-rate source of the collateral token.
pub trait RebasingCollateralAsset: Send + Sync + Debug {
    /// Underlying per share, 18 decimals.
    fn get_index(&self) -> U256;

    /// Convert shares to underlying at the current index.
    fn underlying_by_shares(&self, shares: U256) -> U256 {
        shares * self.get_index() / INDEX_ONE
    }
}

/// Test double with a settable index.
#[derive(Debug)]
pub struct MockRebasingAsset {
    index: RwLock<U256>,
}

impl MockRebasingAsset {
    pub fn new(index: U256) -> Self {
        Self {
            index: RwLock::new(index),
        }
    }

    /// Set the shares-to-underlying rate.
    pub fn set_index(&self, index: U256) {
        *self.index.write() = index;
    }
}

impl Default for MockRebasingAsset {
    fn default() -> Self {
        Self::new(INDEX_ONE)
    }
}

impl RebasingCollateralAsset for MockRebasingAsset {
    fn get_index(&self) -> U256 {
        *self.index.read()
    }
}

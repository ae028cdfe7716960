//! Stake bookkeeping.
//!
//! A stake normalizes collateral to the stake/collateral ratio recorded at
//! the last liquidation, so positions opened after redistributions do not
//! earn rewards that were meant for earlier stakers.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::position::Position;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeState {
    pub total_stakes: U256,
    pub total_stakes_snapshot: U256,
    pub total_collateral_snapshot: U256,
}

impl StakeState {
    /// Stake for `collateral` at the current snapshot ratio.
    pub fn compute_new_stake(&self, collateral: U256) -> U256 {
        if self.total_collateral_snapshot.is_zero() || self.total_stakes_snapshot.is_zero() {
            collateral
        } else {
            collateral * self.total_stakes_snapshot / self.total_collateral_snapshot
        }
    }

    /// Replace the position's stake in `total_stakes`. Returns the new stake.
    pub fn update_stake(&mut self, position: &mut Position) -> U256 {
        let new_stake = self.compute_new_stake(position.collateral);
        self.total_stakes = self.total_stakes.saturating_sub(position.stake) + new_stake;
        position.stake = new_stake;
        new_stake
    }

    /// Drop the position's stake from `total_stakes`.
    pub fn remove_stake(&mut self, position: &mut Position) {
        self.total_stakes = self.total_stakes.saturating_sub(position.stake);
        position.stake = U256::ZERO;
    }

    /// Record the stake/collateral ratio after a liquidation or fee split.
    pub fn refresh_snapshots(&mut self, total_collateral: U256) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = total_collateral;
    }
}

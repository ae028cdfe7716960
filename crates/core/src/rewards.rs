//! Redistribution and staking-fee accumulators.
//!
//! Each accumulator is a running sum of "amount per unit of stake" scaled by
//! 1e18. A position's share is `stake * (current - snapshot) / 1e18`, so a
//! redistribution costs O(1) regardless of how many positions exist.
//!
//! The collateral and fee branches carry the division remainder forward so
//! repeated events do not leak up to `total_stakes - 1` units each time.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::position::{Position, RewardSnapshot};
use crate::u256_math::WAD;

/// Global reward accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    pub debt_per_unit_staked: U256,
    pub coll_per_unit_staked: U256,
    /// Remainder of the last coll division, always `< total_stakes` when written
    pub coll_error: U256,
    pub fee_per_unit_staked: U256,
    pub fee_error: U256,
}

/// Rewards a position has not yet absorbed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRewards {
    pub debt: U256,
    pub coll: U256,
    pub fee: U256,
}

impl PendingRewards {
    pub fn is_zero(&self) -> bool {
        self.debt.is_zero() && self.coll.is_zero() && self.fee.is_zero()
    }
}

impl RewardState {
    /// Spread `(debt, coll)` over `total_stakes`.
    ///
    /// Callers guarantee `total_stakes > 0`; a zero denominator is a no-op.
    pub fn redistribute(&mut self, debt: U256, coll: U256, total_stakes: U256) {
        if total_stakes.is_zero() {
            return;
        }
        self.debt_per_unit_staked += debt * WAD / total_stakes;

        let numerator = coll * WAD + self.coll_error;
        self.coll_per_unit_staked += numerator / total_stakes;
        self.coll_error = numerator % total_stakes;
    }

    /// Record a staking fee taken out of every stake pro rata.
    pub fn accrue_fee(&mut self, fee: U256, total_stakes: U256) {
        if total_stakes.is_zero() {
            return;
        }
        let numerator = fee * WAD + self.fee_error;
        self.fee_per_unit_staked += numerator / total_stakes;
        self.fee_error = numerator % total_stakes;
    }

    /// Current values, to be stored on a touched position.
    pub fn snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            debt: self.debt_per_unit_staked,
            coll: self.coll_per_unit_staked,
            fee: self.fee_per_unit_staked,
        }
    }

    /// Pending rewards for `stake` since `snapshot`.
    pub fn pending(&self, stake: U256, snapshot: &RewardSnapshot) -> PendingRewards {
        if stake.is_zero() {
            return PendingRewards::default();
        }
        PendingRewards {
            debt: stake * (self.debt_per_unit_staked - snapshot.debt) / WAD,
            coll: stake * (self.coll_per_unit_staked - snapshot.coll) / WAD,
            fee: stake * (self.fee_per_unit_staked - snapshot.fee) / WAD,
        }
    }

    /// Pending rewards for an active position.
    pub fn pending_for(&self, position: &Position) -> PendingRewards {
        if !position.is_active() {
            return PendingRewards::default();
        }
        self.pending(position.stake, &position.snapshot)
    }

    /// Fold pending rewards into the position and refresh its snapshot.
    pub fn apply_to(&self, position: &mut Position) -> PendingRewards {
        let pending = self.pending_for(position);
        if position.is_active() {
            position.collateral = position.collateral.saturating_sub(pending.fee) + pending.coll;
            position.debt += pending.debt;
            position.snapshot = self.snapshot();
        }
        pending
    }

    /// `(debt, coll)` including pending rewards, without writing.
    pub fn entire_debt_and_coll(&self, position: &Position) -> (U256, U256) {
        let pending = self.pending_for(position);
        (
            position.debt + pending.debt,
            position.collateral.saturating_sub(pending.fee) + pending.coll,
        )
    }
}

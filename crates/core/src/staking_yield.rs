//! Staking-yield split.
//!
//! Collateral shares appreciate as the rebasing index grows. On each
//! accepted update the protocol keeps `split_bps` of the appreciation of
//! system collateral, measured in shares, and removes those shares from
//! every position pro rata to stake through the fee accumulator. Positions keep the rest of the
//! appreciation through the higher share price.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::u256_math::{bps_of, min, mul_div, MAX_BPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldIndexState {
    /// Index at the last accepted update
    pub last_index: U256,
    /// Unix seconds of the last accepted update
    pub last_update: u64,
    pub split_bps: u16,
    pub min_update_interval: u64,
}

/// Result of one accepted split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub old_index: U256,
    pub new_index: U256,
    /// Appreciation of system collateral since the last update, in shares
    pub yield_coll: U256,
    /// Shares taken by the protocol
    pub fee: U256,
}

impl YieldIndexState {
    pub fn new(index: U256, now: u64, split_bps: u16, min_update_interval: u64) -> Self {
        Self {
            last_index: index,
            last_update: now,
            split_bps,
            min_update_interval,
        }
    }

    /// Reject updates inside the minimum interval.
    pub fn check_interval(&self, now: u64) -> EngineResult<()> {
        let elapsed = now.saturating_sub(self.last_update);
        if elapsed < self.min_update_interval {
            return Err(EngineError::UpdateTooFrequent {
                elapsed,
                required: self.min_update_interval,
            });
        }
        Ok(())
    }

    /// Fee for moving to `new_index`; `None` when the index did not grow.
    ///
    /// `total_coll` counts active and pending collateral shares. The fee is
    /// capped at `active_coll`.
    pub fn compute_split(
        &self,
        new_index: U256,
        total_coll: U256,
        active_coll: U256,
    ) -> Option<SplitOutcome> {
        if new_index <= self.last_index {
            return None;
        }
        let yield_coll = mul_div(total_coll, new_index - self.last_index, new_index);
        let fee = min(bps_of(yield_coll, self.split_bps), active_coll);
        Some(SplitOutcome {
            old_index: self.last_index,
            new_index,
            yield_coll,
            fee,
        })
    }

    /// Record an accepted update.
    pub fn advance(&mut self, new_index: U256, now: u64) {
        self.last_index = new_index;
        self.last_update = now;
    }

    /// Set the split. Returns the previous value.
    pub fn set_split_bps(&mut self, bps: u32) -> EngineResult<u16> {
        if bps > MAX_BPS as u32 {
            return Err(EngineError::ExceedsMax {
                value: bps,
                max: MAX_BPS as u32,
            });
        }
        let old = self.split_bps;
        self.split_bps = bps as u16;
        Ok(old)
    }
}

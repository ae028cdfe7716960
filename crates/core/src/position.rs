//! Position store.
//!
//! A position's `collateral` and `debt` are the raw stored values; pending
//! redistribution rewards and staking fees are only folded in when the
//! position is touched (see [`crate::rewards`]).

use alloy::primitives::{Address, U256};
use cdp_chain::PositionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

impl PositionStatus {
    pub fn is_active(self) -> bool {
        self == PositionStatus::Active
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self,
            PositionStatus::ClosedByOwner
                | PositionStatus::ClosedByLiquidation
                | PositionStatus::ClosedByRedemption
        )
    }
}

/// Global accumulator values as of the position's last touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub debt: U256,
    pub coll: U256,
    pub fee: U256,
}

/// One collateralized loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: Address,
    /// Debt excluding unapplied redistribution
    pub debt: U256,
    /// Collateral shares excluding unapplied rewards and fees
    pub collateral: U256,
    /// Share of redistributions; non-zero only while active
    pub stake: U256,
    pub status: PositionStatus,
    pub snapshot: RewardSnapshot,
}

impl Position {
    /// New active position with no stake assigned yet.
    pub fn open(id: PositionId, owner: Address, collateral: U256, debt: U256) -> Self {
        Self {
            id,
            owner,
            debt,
            collateral,
            stake: U256::ZERO,
            status: PositionStatus::Active,
            snapshot: RewardSnapshot::default(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Zero all balances and move to a terminal status.
    pub fn close(&mut self, status: PositionStatus) {
        debug_assert!(status.is_closed());
        self.debt = U256::ZERO;
        self.collateral = U256::ZERO;
        self.stake = U256::ZERO;
        self.snapshot = RewardSnapshot::default();
        self.status = status;
    }

    pub fn view(&self) -> PositionView {
        PositionView {
            id: self.id,
            owner: self.owner,
            debt: self.debt,
            collateral: self.collateral,
            stake: self.stake,
            status: self.status,
        }
    }
}

/// Read-only projection returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub id: PositionId,
    pub owner: Address,
    pub debt: U256,
    pub collateral: U256,
    pub stake: U256,
    pub status: PositionStatus,
}

impl PositionView {
    /// View for an id that was never allocated.
    pub fn non_existent(id: PositionId) -> Self {
        Self {
            id,
            owner: Address::ZERO,
            debt: U256::ZERO,
            collateral: U256::ZERO,
            stake: U256::ZERO,
            status: PositionStatus::NonExistent,
        }
    }
}

/// All positions ever opened, keyed by id.
///
/// Closed positions stay in the store so their ids are never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionStore {
    positions: BTreeMap<PositionId, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn status(&self, id: PositionId) -> PositionStatus {
        self.positions
            .get(&id)
            .map(|p| p.status)
            .unwrap_or(PositionStatus::NonExistent)
    }

    pub fn view(&self, id: PositionId) -> PositionView {
        self.positions
            .get(&id)
            .map(Position::view)
            .unwrap_or_else(|| PositionView::non_existent(id))
    }

    pub fn put(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn active(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_active())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

//! Engine event log.
//!
//! Events are appended only when an operation commits and can be drained
//! by the host (the simulation binary serializes them as JSON lines).

use alloy::primitives::{Address, U256};
use cdp_chain::PositionId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::position::PositionStatus;

/// Position mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOperation {
    AddCollateral,
    WithdrawCollateral,
    DrawDebt,
    RepayDebt,
    ApplyRewards,
    Redeem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    PositionOpened {
        id: PositionId,
        owner: Address,
        collateral: U256,
        debt: U256,
        stake: U256,
    },
    PositionUpdated {
        id: PositionId,
        operation: PositionOperation,
        collateral: U256,
        debt: U256,
        stake: U256,
    },
    PositionClosed {
        id: PositionId,
        status: PositionStatus,
    },
    Liquidation {
        liquidator: Address,
        liquidated: SmallVec<[PositionId; 8]>,
        total_debt: U256,
        total_coll: U256,
        gas_compensation: U256,
        debt_offset: U256,
        coll_offset: U256,
        debt_redistributed: U256,
        coll_redistributed: U256,
        coll_surplus: U256,
    },
    Redistribution {
        id: PositionId,
        debt: U256,
        coll: U256,
        debt_per_unit_staked: U256,
        coll_per_unit_staked: U256,
    },
    Redemption {
        id: PositionId,
        redeemer: Address,
        debt: U256,
        coll: U256,
    },
    SurplusCredited {
        owner: Address,
        amount: U256,
    },
    SurplusClaimed {
        owner: Address,
        amount: U256,
    },
    StakingSplitClaimed {
        old_index: U256,
        new_index: U256,
        yield_coll: U256,
        fee: U256,
        fee_per_unit_staked: U256,
    },
    SplitBpsUpdated {
        old: u16,
        new: u16,
    },
    UpdateIntervalUpdated {
        old: u64,
        new: u64,
    },
    RecoveryModeEntered {
        at: u64,
    },
    RecoveryModeExited {
        at: u64,
    },
}

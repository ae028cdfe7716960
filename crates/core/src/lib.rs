//! CDP liquidation and redistribution engine.
//!
//! This crate provides:
//! - Position store with lazily applied reward snapshots
//! - O(1) redistribution via scaled per-stake accumulators
//! - Stake normalization against the last liquidation snapshot
//! - Normal / Recovery mode selection and per-position treatment
//! - Batch liquidation with buffer offset, redistribution and surplus
//! - Staking-yield split on a rebasing collateral asset
//! - Transactional engine facade and a serialized async service
//!
//! Collaborator contracts (oracle, buffer, index, ...) live in `cdp-chain`.

pub mod config;
mod engine;
mod error;
mod events;
mod ledger;
mod liquidation;
mod mode;
mod position;
mod rewards;
mod service;
mod stake;
mod staking_yield;
mod surplus;
pub mod u256_math;

pub use config::{load_config, load_config_file, EngineConfig};
pub use engine::{CdpEngine, Collaborators, EntireDebtAndColl};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, PositionOperation};
pub use ledger::{
    ConservationReport, FlowTotals, LedgerGlobals, LedgerState, MarketSnapshot, Pool, PoolTotals,
};
pub use liquidation::{LiquidationSummary, PositionLiquidation};
pub use mode::{Eligibility, LiquidationModeSelector, SkipReason, SystemMode, Treatment};
pub use position::{Position, PositionStatus, PositionStore, PositionView, RewardSnapshot};
pub use rewards::{PendingRewards, RewardState};
pub use service::LedgerService;
pub use stake::StakeState;
pub use staking_yield::{SplitOutcome, YieldIndexState};
pub use surplus::SurplusTracker;

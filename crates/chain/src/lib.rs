//! CDP engine collaborator layer.
//!
//! This crate provides the external contracts the engine consumes:
//! - Price oracle (collateral underlying priced in debt units)
//! - Rebasing collateral asset index
//! - Liquidity buffer that absorbs liquidated debt
//! - NICR sorted position index
//! - Collateral transfer ledger
//! - Access control for governance setters
//! - Clock
//!
//! Each contract ships with an in-memory implementation used by tests and
//! the simulation binary.

pub mod access;
pub mod balances;
pub mod buffer;
pub mod clock;
pub mod index;
pub mod oracle;
pub mod rebasing;
pub mod types;

pub use access::{AccessControl, Permission, RoleAccessControl};
pub use balances::{CollateralLedger, InMemoryCollateralLedger};
pub use buffer::{InMemoryBuffer, LiquidityBuffer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use index::{NicrSortedIndex, PositionIndex};
pub use oracle::{PriceOracle, StaticPriceOracle};
pub use rebasing::{MockRebasingAsset, RebasingCollateralAsset, INDEX_ONE};
pub use types::PositionId;

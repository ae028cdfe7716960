//! Shared harness: an engine wired to in-memory collaborators.

#![allow(dead_code)]

use alloy::primitives::{Address, U256};
use cdp_chain::{
    InMemoryBuffer, InMemoryCollateralLedger, ManualClock, MockRebasingAsset, NicrSortedIndex,
    PositionId, RoleAccessControl, StaticPriceOracle, INDEX_ONE,
};
use cdp_core::{CdpEngine, Collaborators, EngineConfig};
use std::sync::Arc;

pub const START: u64 = 1_700_000_000;

pub fn wad(n: u64) -> U256 {
    U256::from(n) * INDEX_ONE
}

/// `num / den` tokens in base units.
pub fn frac(num: u64, den: u64) -> U256 {
    U256::from(num) * INDEX_ONE / U256::from(den)
}

pub fn user(tag: u8) -> Address {
    Address::repeat_byte(tag)
}

pub fn admin() -> Address {
    Address::repeat_byte(0xad)
}

pub fn liquidator() -> Address {
    Address::repeat_byte(0x11)
}

pub fn fee_recipient() -> Address {
    Address::repeat_byte(0xfe)
}

pub struct Harness {
    pub engine: Arc<CdpEngine>,
    pub oracle: Arc<StaticPriceOracle>,
    pub buffer: Arc<InMemoryBuffer>,
    pub index: Arc<NicrSortedIndex>,
    pub asset: Arc<MockRebasingAsset>,
    pub ledger: Arc<InMemoryCollateralLedger>,
    pub access: Arc<RoleAccessControl>,
    pub clock: Arc<ManualClock>,
}

/// Default thresholds (MCR 110%, CCR 150%, divisor 200) with the given grace period.
pub fn config(grace_period_secs: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.liquidation.recovery_grace_period_secs = grace_period_secs;
    config.staking.fee_recipient = fee_recipient();
    config
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        Self::try_new(config).expect("valid engine config")
    }

    pub fn try_new(config: EngineConfig) -> anyhow::Result<Self> {
        let oracle = Arc::new(StaticPriceOracle::new(wad(100)));
        let buffer = Arc::new(InMemoryBuffer::new());
        let index = Arc::new(NicrSortedIndex::new());
        let asset = Arc::new(MockRebasingAsset::default());
        let ledger = Arc::new(InMemoryCollateralLedger::new());
        let access = Arc::new(RoleAccessControl::with_admin(admin()));
        let clock = Arc::new(ManualClock::new(START));

        let collaborators = Collaborators {
            oracle: oracle.clone(),
            buffer: buffer.clone(),
            index: index.clone(),
            asset: asset.clone(),
            ledger: ledger.clone(),
            access: access.clone(),
            clock: clock.clone(),
        };
        let engine = Arc::new(CdpEngine::new(config, collaborators)?);

        Ok(Self {
            engine,
            oracle,
            buffer,
            index,
            asset,
            ledger,
            access,
            clock,
        })
    }

    pub fn set_price(&self, whole: u64) {
        self.oracle.set_price(wad(whole));
    }

    /// Open a position with whole-token amounts.
    pub fn open(&self, owner: Address, coll: u64, debt: u64) -> PositionId {
        self.engine
            .open_position(owner, wad(coll), wad(debt))
            .expect("open position")
    }

    pub fn assert_balanced(&self) {
        let report = self.engine.conservation();
        assert!(report.is_balanced(), "collateral leak: {report:?}");
        assert!(
            report.position_drift() <= U256::from(1_000_000u64),
            "position drift too large: {report:?}"
        );
    }
}

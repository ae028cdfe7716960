//! CDP engine simulator
//!
//! Runs a `CdpEngine` over in-memory collaborators:
//! - opens a population of positions at staggered collateral ratios
//! - walks a scripted price path while the collateral index rebases upward
//! - liquidates from the lowest NICR and claims the staking split each step
//! - checks collateral conservation after every step
//!
//! The final report is printed to stdout as JSON.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdp_chain::{
    InMemoryBuffer, InMemoryCollateralLedger, LiquidityBuffer, ManualClock, MockRebasingAsset,
    NicrSortedIndex, PriceOracle, RebasingCollateralAsset, RoleAccessControl, StaticPriceOracle,
    INDEX_ONE,
};
use cdp_core::u256_math::{bps_of, f64_to_wad, wad_to_f64};
use cdp_core::{
    load_config, CdpEngine, Collaborators, EngineConfig, EngineError, FlowTotals, LedgerService,
    LiquidationSummary, PoolTotals,
};

/// Environment variable names.
mod env {
    pub const POSITIONS: &str = "CDP_SIM_POSITIONS";
    pub const STEPS: &str = "CDP_SIM_STEPS";
    pub const START_PRICE: &str = "CDP_SIM_START_PRICE";
    pub const BUFFER_BPS: &str = "CDP_SIM_BUFFER_BPS";
    pub const LOG_JSON: &str = "CDP_LOG_JSON";
}

/// Per-step price moves in bps of the previous price.
const PRICE_PATH_BPS: [u16; 12] = [
    10_000, 9_800, 9_600, 9_700, 9_300, 9_100, 9_500, 10_200, 10_400, 9_400, 9_000, 10_600,
];

/// Index growth per step (bps).
const INDEX_GROWTH_BPS: u16 = 4;

/// Simulated seconds per step.
const STEP_SECS: u64 = 43_200;

const START_TIME: u64 = 1_700_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = load_config()?;
    config.log_config();

    let positions: usize = env_or(env::POSITIONS, 40)?;
    let steps: usize = env_or(env::STEPS, 24)?;
    let start_price: f64 = env_or(env::START_PRICE, 2_000.0)?;
    let buffer_bps: u16 = env_or(env::BUFFER_BPS, 3_000)?;

    let sim = Simulation::new(config, f64_to_wad(start_price))?;
    let (service, worker) = LedgerService::spawn(sim.engine.clone(), 64);

    let opened = sim.open_population(&service, positions).await?;
    let total_debt = sim.engine.pool_totals().total_debt();
    sim.buffer.deposit(bps_of(total_debt, buffer_bps));
    info!(
        opened,
        total_debt = wad_to_f64(total_debt),
        buffer = wad_to_f64(sim.buffer.available_balance()),
        "Population opened"
    );

    let mut report = SimReport {
        profile: sim.engine.config().profile.clone(),
        positions_opened: opened,
        steps: Vec::with_capacity(steps),
        flows: FlowTotals::default(),
        pools: PoolTotals::default(),
        active_positions: 0,
        buffer_remaining: 0.0,
        buffer_collateral_gains: 0.0,
        events: 0,
    };

    for step in 0..steps {
        let step_report = sim.step(&service, step).await?;
        report.steps.push(step_report);
        report.events += sim.engine.drain_events().len();
    }

    drop(service);
    worker.await?;

    report.flows = sim.engine.flow_totals();
    report.pools = sim.engine.pool_totals();
    report.active_positions = sim.engine.active_count();
    report.buffer_remaining = wad_to_f64(sim.buffer.available_balance());
    report.buffer_collateral_gains = wad_to_f64(sim.buffer.collateral_gains());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() {
    let json = std::env::var(env::LOG_JSON).is_ok();
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cdp_core=info,cdp_chain=warn")),
        )
        .init();
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: usize,
    price: f64,
    index: f64,
    tcr: f64,
    recovery_mode: bool,
    liquidated: usize,
    skipped: usize,
    debt_offset: f64,
    debt_redistributed: f64,
    coll_surplus: f64,
    split_fee: f64,
}

#[derive(Debug, Serialize)]
struct SimReport {
    profile: String,
    positions_opened: usize,
    steps: Vec<StepReport>,
    flows: FlowTotals,
    pools: PoolTotals,
    active_positions: usize,
    buffer_remaining: f64,
    buffer_collateral_gains: f64,
    events: usize,
}

struct Simulation {
    engine: Arc<CdpEngine>,
    oracle: Arc<StaticPriceOracle>,
    buffer: Arc<InMemoryBuffer>,
    asset: Arc<MockRebasingAsset>,
    clock: Arc<ManualClock>,
    keeper: Address,
    batch_size: usize,
}

impl Simulation {
    fn new(config: EngineConfig, start_price: U256) -> Result<Self> {
        let oracle = Arc::new(StaticPriceOracle::new(start_price));
        let buffer = Arc::new(InMemoryBuffer::new());
        let asset = Arc::new(MockRebasingAsset::default());
        let clock = Arc::new(ManualClock::new(START_TIME));
        let batch_size = config.liquidation.batch_size;

        let collaborators = Collaborators {
            oracle: oracle.clone(),
            buffer: buffer.clone(),
            index: Arc::new(NicrSortedIndex::new()),
            asset: asset.clone(),
            ledger: Arc::new(InMemoryCollateralLedger::new()),
            access: Arc::new(RoleAccessControl::new()),
            clock: clock.clone(),
        };

        Ok(Self {
            engine: Arc::new(CdpEngine::new(config, collaborators)?),
            oracle,
            buffer,
            asset,
            clock,
            keeper: Address::repeat_byte(0x4b),
            batch_size,
        })
    }

    /// Open `count` positions; rejected ones are logged and skipped.
    async fn open_population(&self, service: &LedgerService, count: usize) -> Result<usize> {
        let price = self.oracle_price();
        let mut opened = 0;

        for i in 0..count {
            let owner = Address::left_padding_from(&(i as u64 + 1).to_be_bytes());
            let coll = U256::from(5 + (i % 7) as u64) * INDEX_ONE;
            // collateral ratio between 125% and 375%
            let ratio_pct = 125 + (i as u64 * 37) % 250;
            let debt = coll * price / INDEX_ONE * U256::from(100u64) / U256::from(ratio_pct);

            match service.open_position(owner, coll, debt).await {
                Ok(id) => {
                    debug!(id = %id, ratio_pct, "Opened position");
                    opened += 1;
                }
                Err(e) => warn!(owner = %owner, ratio_pct, error = %e, "Position rejected"),
            }
        }
        Ok(opened)
    }

    fn oracle_price(&self) -> U256 {
        self.oracle.get_price().unwrap_or(U256::ZERO)
    }

    async fn step(&self, service: &LedgerService, step: usize) -> Result<StepReport> {
        let move_bps = PRICE_PATH_BPS[step % PRICE_PATH_BPS.len()];
        let price = bps_of(self.oracle_price(), move_bps);
        self.oracle.set_price(price);

        let index = self.asset.get_index();
        let index = index + bps_of(index, INDEX_GROWTH_BPS);
        self.asset.set_index(index);
        self.clock.advance(STEP_SECS);

        let summary = match service.liquidate_lowest(self.keeper, self.batch_size).await {
            Ok(summary) => summary,
            Err(EngineError::OnlyOnePositionInSystem) => {
                warn!(step, "Last active position left, liquidation skipped");
                LiquidationSummary::default()
            }
            Err(e) => return Err(e.into()),
        };

        let split_fee = match service.claim_split().await {
            Ok(Some(split)) => split.fee,
            Ok(None) => U256::ZERO,
            Err(e @ EngineError::UpdateTooFrequent { .. }) => {
                debug!(error = %e, "Split not due yet");
                U256::ZERO
            }
            Err(e) => return Err(e.into()),
        };

        let tcr = service.get_tcr().await?;
        let recovery_mode = tcr < self.engine.config().ccr();

        let conservation = self.engine.conservation();
        if !conservation.is_balanced() {
            bail!("Collateral not conserved at step {}: {:?}", step, conservation);
        }

        info!(
            step,
            price = wad_to_f64(price),
            tcr = wad_to_f64(tcr),
            recovery_mode,
            liquidated = summary.liquidated.len(),
            "Step complete"
        );

        Ok(StepReport {
            step,
            price: wad_to_f64(price),
            index: wad_to_f64(index),
            tcr: wad_to_f64(tcr),
            recovery_mode,
            liquidated: summary.liquidated.len(),
            skipped: summary.skipped.len(),
            debt_offset: wad_to_f64(summary.total_debt_offset),
            debt_redistributed: wad_to_f64(summary.total_debt_redistributed),
            coll_surplus: wad_to_f64(summary.total_coll_surplus),
            split_fee: wad_to_f64(split_fee),
        })
    }
}

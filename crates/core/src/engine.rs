//! Engine facade.
//!
//! `CdpEngine` owns the ledger behind one writer lock and wires it to the
//! collaborators. Each mutating call:
//! 1. reads the market (price, rebasing index, clock, buffer balance)
//! 2. plans the operation against a [`LedgerTx`] overlay
//! 3. syncs the Recovery Mode grace period
//! 4. calls the buffer once with the batch offset totals
//! 5. commits the overlay and applies the queued transfers and index updates
//!
//! Any error before step 5 leaves the ledger exactly as it was.

use alloy::primitives::{Address, U256};
use anyhow::Context;
use cdp_chain::{
    AccessControl, Clock, CollateralLedger, LiquidityBuffer, Permission, PositionId,
    PositionIndex, PriceOracle, RebasingCollateralAsset,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::ledger::{
    ConservationReport, EngineParams, Effects, FlowTotals, IndexUpdate, LedgerState, LedgerTx,
    MarketSnapshot, PoolTotals,
};
use crate::liquidation::{liquidate_batch, BatchMode, LiquidationSummary};
use crate::mode::SystemMode;
use crate::position::PositionView;
use crate::rewards::{PendingRewards, RewardState};
use crate::stake::StakeState;
use crate::staking_yield::{SplitOutcome, YieldIndexState};
use crate::u256_math::{compute_cr, share_price};

/// External contracts the engine consumes.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub oracle: Arc<dyn PriceOracle>,
    pub buffer: Arc<dyn LiquidityBuffer>,
    pub index: Arc<dyn PositionIndex>,
    pub asset: Arc<dyn RebasingCollateralAsset>,
    pub ledger: Arc<dyn CollateralLedger>,
    pub access: Arc<dyn AccessControl>,
    pub clock: Arc<dyn Clock>,
}

/// Entire position balances including pending rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntireDebtAndColl {
    pub debt: U256,
    pub coll: U256,
    pub pending: PendingRewards,
}

#[derive(Debug)]
pub struct CdpEngine {
    config: EngineConfig,
    params: EngineParams,
    collaborators: Collaborators,
    state: Mutex<LedgerState>,
}

impl CdpEngine {
    /// Create an engine. The yield tracker starts from the asset's current
    /// index and the clock's current time.
    ///
    /// Fails if the config does not validate.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        config.validate().context("invalid engine config")?;
        let yield_state = YieldIndexState::new(
            collaborators.asset.get_index(),
            collaborators.clock.now(),
            config.staking.split_bps,
            config.staking.min_update_interval_secs,
        );
        info!(
            profile = %config.profile,
            mcr_bps = config.ratios.mcr_bps,
            ccr_bps = config.ratios.ccr_bps,
            "CDP engine created"
        );
        Ok(Self {
            params: EngineParams::from_config(&config),
            config,
            collaborators,
            state: Mutex::new(LedgerState::new(yield_state)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn market(&self) -> EngineResult<MarketSnapshot> {
        let price = self
            .collaborators
            .oracle
            .get_price()
            .map_err(|e| EngineError::Oracle(format!("{e:#}")))?;
        let index = self.collaborators.asset.get_index();
        if price.is_zero() || index.is_zero() {
            return Err(EngineError::InvalidPrice);
        }
        Ok(MarketSnapshot {
            price,
            index,
            share_price: share_price(price, index),
            now: self.collaborators.clock.now(),
            buffer_available: self.collaborators.buffer.available_balance(),
        })
    }

    /// Run one mutating operation as a transaction.
    fn run<T>(&self, op: impl FnOnce(&mut LedgerTx<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let mut state = self.state.lock();
        let market = self.market()?;

        let (output, committed) = {
            let mut tx = LedgerTx::new(&state, &self.params, market);
            let output = op(&mut tx)?;
            tx.sync_grace_period();
            (output, tx.into_committed())
        };

        let (debt, coll) = committed.effects.buffer_offset;
        if !debt.is_zero() || !coll.is_zero() {
            self.collaborators
                .buffer
                .offset(debt, coll)
                .map_err(|e| EngineError::Buffer(format!("{e:#}")))?;
        }

        let effects = state.commit(committed);
        self.apply_effects(effects);
        Ok(output)
    }

    fn apply_effects(&self, effects: Effects) {
        for (to, amount) in effects.transfers {
            self.collaborators.ledger.credit(to, amount);
        }
        for update in effects.index_updates {
            match update {
                IndexUpdate::Insert(id, nicr) => self.collaborators.index.insert(id, nicr),
                IndexUpdate::Remove(id) => self.collaborators.index.remove(id),
            }
        }
    }

    // ---- liquidation ----

    /// Liquidate every eligible position in `ids`. Non-active ids are skipped.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn liquidate(
        &self,
        liquidator: Address,
        ids: &[PositionId],
    ) -> EngineResult<LiquidationSummary> {
        if ids.is_empty() {
            return Err(EngineError::EmptyPositionList);
        }
        self.run(|tx| liquidate_batch(tx, liquidator, ids, BatchMode::Listed))
            .map_err(log_rejection)
    }

    /// Liquidate a single position; it must be active.
    #[instrument(skip(self), fields(id = %id))]
    pub fn liquidate_position(
        &self,
        liquidator: Address,
        id: PositionId,
    ) -> EngineResult<LiquidationSummary> {
        self.run(|tx| {
            tx.load_active(id)?;
            liquidate_batch(tx, liquidator, &[id], BatchMode::Listed)
        })
        .map_err(log_rejection)
    }

    /// Walk up to `n` positions from the lowest NICR upward.
    #[instrument(skip(self))]
    pub fn liquidate_lowest(
        &self,
        liquidator: Address,
        n: usize,
    ) -> EngineResult<LiquidationSummary> {
        let candidates = self.collaborators.index.ascending(n);
        if candidates.is_empty() {
            return Ok(LiquidationSummary::default());
        }
        debug!(candidates = candidates.len(), "Sequential liquidation");
        self.run(|tx| liquidate_batch(tx, liquidator, &candidates, BatchMode::Sequential))
    }

    // ---- staking split ----

    /// Take the protocol share of staking yield since the last update.
    #[instrument(skip(self))]
    pub fn claim_split(&self) -> EngineResult<Option<SplitOutcome>> {
        let outcome = self.run(|tx| tx.claim_split())?;
        match &outcome {
            Some(split) => info!(
                new_index = %split.new_index,
                yield_coll = %split.yield_coll,
                fee = %split.fee,
                "Staking split claimed"
            ),
            None => debug!("Index did not grow, split skipped"),
        }
        Ok(outcome)
    }

    #[instrument(skip(self), fields(caller = %caller))]
    pub fn set_split_bps(&self, caller: Address, bps: u32) -> EngineResult<()> {
        self.authorize(&caller, Permission::SetSplitBps)?;
        self.run(|tx| tx.set_split_bps(bps))
    }

    #[instrument(skip(self), fields(caller = %caller))]
    pub fn set_min_update_interval(&self, caller: Address, secs: u64) -> EngineResult<()> {
        self.authorize(&caller, Permission::SetUpdateInterval)?;
        self.run(|tx| {
            tx.set_min_update_interval(secs);
            Ok(())
        })
    }

    fn authorize(&self, caller: &Address, permission: Permission) -> EngineResult<()> {
        if self.collaborators.access.is_authorized(caller, permission) {
            Ok(())
        } else {
            warn!(caller = %caller, ?permission, "Unauthorized call");
            Err(EngineError::Unauthorized)
        }
    }

    // ---- surplus ----

    pub fn get_claimable(&self, owner: &Address) -> U256 {
        self.state.lock().surplus.get_claimable(owner)
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub fn claim_surplus(&self, owner: Address) -> EngineResult<U256> {
        self.run(|tx| tx.claim_surplus(owner))
    }

    // ---- position operations ----

    #[instrument(skip(self), fields(owner = %owner))]
    pub fn open_position(
        &self,
        owner: Address,
        coll: U256,
        debt: U256,
    ) -> EngineResult<PositionId> {
        self.run(|tx| tx.open_position(owner, coll, debt))
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn add_collateral(&self, id: PositionId, amount: U256) -> EngineResult<()> {
        self.run(|tx| tx.add_collateral(id, amount))
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn withdraw_collateral(&self, id: PositionId, amount: U256) -> EngineResult<()> {
        self.run(|tx| tx.withdraw_collateral(id, amount))
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn draw_debt(&self, id: PositionId, amount: U256) -> EngineResult<()> {
        self.run(|tx| tx.draw_debt(id, amount))
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn repay_debt(&self, id: PositionId, amount: U256) -> EngineResult<()> {
        self.run(|tx| tx.repay_debt(id, amount))
    }

    /// Close a position; returns the collateral sent to the owner.
    #[instrument(skip(self), fields(id = %id))]
    pub fn close_position(&self, id: PositionId) -> EngineResult<U256> {
        self.run(|tx| tx.close_position(id))
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn apply_pending_rewards(&self, id: PositionId) -> EngineResult<PendingRewards> {
        self.run(|tx| tx.apply_pending_rewards(id))
    }

    /// Redeem debt against a position; returns collateral sent to `redeemer`.
    #[instrument(skip(self), fields(redeemer = %redeemer, id = %id))]
    pub fn redeem(
        &self,
        redeemer: Address,
        id: PositionId,
        debt_amount: U256,
    ) -> EngineResult<U256> {
        self.run(|tx| tx.redeem(redeemer, id, debt_amount))
    }

    /// Record Recovery Mode entry/exit without any other change.
    pub fn sync_grace_period(&self) -> EngineResult<()> {
        self.run(|_| Ok(()))
    }

    // ---- views ----

    pub fn get_position(&self, id: PositionId) -> PositionView {
        self.state.lock().positions.view(id)
    }

    pub fn entire_debt_and_coll(&self, id: PositionId) -> EngineResult<EntireDebtAndColl> {
        let state = self.state.lock();
        let position = state
            .positions
            .get(id)
            .filter(|p| p.is_active())
            .ok_or(EngineError::PositionNotActive(id))?;
        let rewards = &state.globals.rewards;
        let (debt, coll) = rewards.entire_debt_and_coll(position);
        Ok(EntireDebtAndColl {
            debt,
            coll,
            pending: rewards.pending_for(position),
        })
    }

    /// Individual collateral ratio at the current price.
    pub fn get_icr(&self, id: PositionId) -> EngineResult<U256> {
        let entire = self.entire_debt_and_coll(id)?;
        let market = self.market()?;
        Ok(compute_cr(entire.coll, entire.debt, market.share_price))
    }

    pub fn get_tcr(&self) -> EngineResult<U256> {
        let market = self.market()?;
        let pools = self.state.lock().globals.pools;
        Ok(self
            .params
            .selector
            .tcr(pools.total_coll(), pools.total_debt(), market.share_price))
    }

    pub fn check_recovery_mode(&self) -> EngineResult<bool> {
        let tcr = self.get_tcr()?;
        Ok(self.params.selector.mode(tcr) == SystemMode::Recovery)
    }

    pub fn reward_state(&self) -> RewardState {
        self.state.lock().globals.rewards
    }

    pub fn stake_state(&self) -> StakeState {
        self.state.lock().globals.stakes
    }

    pub fn pool_totals(&self) -> PoolTotals {
        self.state.lock().globals.pools
    }

    pub fn flow_totals(&self) -> FlowTotals {
        self.state.lock().globals.flows
    }

    pub fn yield_state(&self) -> YieldIndexState {
        self.state.lock().globals.yield_state
    }

    pub fn recovery_triggered_at(&self) -> Option<u64> {
        self.state.lock().globals.recovery_triggered_at
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().globals.active_count
    }

    pub fn active_positions(&self) -> Vec<PositionView> {
        self.state
            .lock()
            .positions
            .active()
            .map(|p| p.view())
            .collect()
    }

    pub fn conservation(&self) -> ConservationReport {
        self.state.lock().conservation()
    }

    /// Full copy of the ledger, for comparisons in tests and tooling.
    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    /// Take all events committed since the last drain.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.state.lock().events)
    }
}

fn log_rejection(error: EngineError) -> EngineError {
    warn!(error = %error, "Liquidation rejected");
    error
}

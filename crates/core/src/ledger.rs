//! Ledger state and the per-operation transaction overlay.
//!
//! Every public operation runs against a [`LedgerTx`]: touched positions,
//! touched surplus entries and a copy of the (small) global struct are held
//! in the overlay, while side effects on collaborators are queued in
//! [`Effects`]. Dropping the overlay discards everything; committing writes
//! it back in one step.

use alloy::primitives::{Address, U256};
use cdp_chain::PositionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, PositionOperation};
use crate::mode::{LiquidationModeSelector, SystemMode};
use crate::position::{Position, PositionStatus, PositionStore};
use crate::rewards::{PendingRewards, RewardState};
use crate::stake::StakeState;
use crate::staking_yield::{SplitOutcome, YieldIndexState};
use crate::surplus::SurplusTracker;
use crate::u256_math::{compute_cr, compute_nominal_cr, mul_div, WAD};

/// Collateral shares and debt held in one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub coll: U256,
    pub debt: U256,
}

/// Active balances plus redistributed amounts not yet applied to positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    pub active: Pool,
    pub pending: Pool,
}

impl PoolTotals {
    pub fn total_coll(&self) -> U256 {
        self.active.coll + self.pending.coll
    }

    pub fn total_debt(&self) -> U256 {
        self.active.debt + self.pending.debt
    }
}

/// Cumulative collateral flows in and out of the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTotals {
    pub deposited: U256,
    /// Withdrawals and collateral returned on close
    pub withdrawn: U256,
    pub redeemed: U256,
    pub gas_compensation: U256,
    /// Collateral handed to the buffer
    pub coll_offset: U256,
    /// Staking split fees
    pub fees: U256,
    pub surplus_credited: U256,
    pub surplus_claimed: U256,
}

impl FlowTotals {
    /// Collateral that has left the system for good.
    pub fn outflows(&self) -> U256 {
        self.withdrawn
            + self.redeemed
            + self.gas_compensation
            + self.coll_offset
            + self.fees
            + self.surplus_claimed
    }
}

/// Global scalars, cloned into every transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerGlobals {
    pub rewards: RewardState,
    pub stakes: StakeState,
    pub pools: PoolTotals,
    pub flows: FlowTotals,
    pub yield_state: YieldIndexState,
    /// Set when Recovery Mode is first observed, cleared in Normal Mode
    pub recovery_triggered_at: Option<u64>,
    pub next_id: u64,
    pub active_count: usize,
}

/// Everything the engine owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    pub positions: PositionStore,
    pub globals: LedgerGlobals,
    pub surplus: SurplusTracker,
    pub events: Vec<EngineEvent>,
}

impl LedgerState {
    pub fn new(yield_state: YieldIndexState) -> Self {
        Self {
            positions: PositionStore::new(),
            globals: LedgerGlobals {
                rewards: RewardState::default(),
                stakes: StakeState::default(),
                pools: PoolTotals::default(),
                flows: FlowTotals::default(),
                yield_state,
                recovery_triggered_at: None,
                next_id: 1,
                active_count: 0,
            },
            surplus: SurplusTracker::new(),
            events: Vec::new(),
        }
    }

    /// Write a finished transaction back. Returns the collaborator effects
    /// still to be applied.
    pub fn commit(&mut self, committed: Committed) -> Effects {
        let Committed {
            touched,
            globals,
            surplus,
            mut effects,
        } = committed;

        for (_, position) in touched {
            self.positions.put(position);
        }
        for (owner, amount) in surplus {
            self.surplus.set(owner, amount);
        }
        self.globals = globals;
        self.events.append(&mut effects.events);
        effects
    }

    /// Collateral accounting check.
    pub fn conservation(&self) -> ConservationReport {
        let globals = &self.globals;
        let accounted =
            globals.pools.total_coll() + self.surplus.total() + globals.flows.outflows();

        let position_collateral = self
            .positions
            .active()
            .fold(U256::ZERO, |acc, p| acc + globals.rewards.entire_debt_and_coll(p).1);

        ConservationReport {
            deposited: globals.flows.deposited,
            accounted,
            pool_collateral: globals.pools.total_coll(),
            position_collateral,
        }
    }
}

/// Result of [`LedgerState::conservation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    pub deposited: U256,
    /// Pools + outstanding surplus + outflows
    pub accounted: U256,
    /// Active + pending pool collateral
    pub pool_collateral: U256,
    /// Sum of every active position's collateral including pending rewards
    pub position_collateral: U256,
}

impl ConservationReport {
    /// Pool-level accounting is exact.
    pub fn is_balanced(&self) -> bool {
        self.deposited == self.accounted
    }

    /// Truncation drift between pools and the positions they back.
    pub fn position_drift(&self) -> U256 {
        if self.pool_collateral > self.position_collateral {
            self.pool_collateral - self.position_collateral
        } else {
            self.position_collateral - self.pool_collateral
        }
    }
}

/// Thresholds and limits resolved once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub selector: LiquidationModeSelector,
    pub min_debt: U256,
    pub gas_divisor: U256,
    pub fee_recipient: Address,
}

impl EngineParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            selector: LiquidationModeSelector::from_config(config),
            min_debt: config.min_debt(),
            gas_divisor: U256::from(config.liquidation.coll_gas_compensation_divisor.max(1)),
            fee_recipient: config.staking.fee_recipient,
        }
    }
}

/// Market inputs read once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Debt per underlying collateral unit (WAD)
    pub price: U256,
    /// Underlying per collateral share (WAD)
    pub index: U256,
    /// Debt per collateral share (WAD)
    pub share_price: U256,
    pub now: u64,
    pub buffer_available: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    Insert(PositionId, U256),
    Remove(PositionId),
}

/// Side effects queued by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub transfers: Vec<(Address, U256)>,
    pub index_updates: Vec<IndexUpdate>,
    /// Batch totals for the single buffer call: (debt, coll)
    pub buffer_offset: (U256, U256),
    pub events: Vec<EngineEvent>,
}

/// Owned output of a finished transaction.
#[derive(Debug)]
pub struct Committed {
    pub touched: HashMap<PositionId, Position>,
    pub globals: LedgerGlobals,
    pub surplus: HashMap<Address, U256>,
    pub effects: Effects,
}

/// Overlay over [`LedgerState`] for one operation.
pub struct LedgerTx<'a> {
    base: &'a LedgerState,
    pub(crate) params: &'a EngineParams,
    pub(crate) market: MarketSnapshot,
    touched: HashMap<PositionId, Position>,
    surplus: HashMap<Address, U256>,
    pub(crate) globals: LedgerGlobals,
    pub(crate) effects: Effects,
}

impl<'a> LedgerTx<'a> {
    pub fn new(base: &'a LedgerState, params: &'a EngineParams, market: MarketSnapshot) -> Self {
        Self {
            base,
            params,
            market,
            touched: HashMap::new(),
            surplus: HashMap::new(),
            globals: base.globals.clone(),
            effects: Effects::default(),
        }
    }

    pub fn into_committed(self) -> Committed {
        Committed {
            touched: self.touched,
            globals: self.globals,
            surplus: self.surplus,
            effects: self.effects,
        }
    }

    // ---- reads ----

    pub fn position(&self, id: PositionId) -> Option<Position> {
        self.touched
            .get(&id)
            .or_else(|| self.base.positions.get(id))
            .cloned()
    }

    pub(crate) fn load_active(&self, id: PositionId) -> EngineResult<Position> {
        self.position(id)
            .filter(Position::is_active)
            .ok_or(EngineError::PositionNotActive(id))
    }

    pub fn surplus_of(&self, owner: &Address) -> U256 {
        self.surplus
            .get(owner)
            .copied()
            .unwrap_or_else(|| self.base.surplus.get_claimable(owner))
    }

    pub fn selector(&self) -> &LiquidationModeSelector {
        &self.params.selector
    }

    pub fn tcr(&self) -> U256 {
        let pools = &self.globals.pools;
        self.params
            .selector
            .tcr(pools.total_coll(), pools.total_debt(), self.market.share_price)
    }

    pub fn mode(&self) -> SystemMode {
        self.params.selector.mode(self.tcr())
    }

    #[inline]
    pub fn icr(&self, coll: U256, debt: U256) -> U256 {
        compute_cr(coll, debt, self.market.share_price)
    }

    /// TCR after moving collateral/debt in and out of the active pool.
    fn tcr_after(&self, coll_in: U256, coll_out: U256, debt_in: U256, debt_out: U256) -> U256 {
        let pools = &self.globals.pools;
        let coll = (pools.total_coll() + coll_in).saturating_sub(coll_out);
        let debt = (pools.total_debt() + debt_in).saturating_sub(debt_out);
        compute_cr(coll, debt, self.market.share_price)
    }

    /// What the buffer still holds after offsets queued in this transaction.
    pub fn buffer_remaining(&self) -> U256 {
        self.market
            .buffer_available
            .saturating_sub(self.effects.buffer_offset.0)
    }

    // ---- writes ----

    pub(crate) fn store(&mut self, position: Position) {
        self.touched.insert(position.id, position);
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.effects.events.push(event);
    }

    pub(crate) fn transfer(&mut self, to: Address, amount: U256) {
        if !amount.is_zero() {
            self.effects.transfers.push((to, amount));
        }
    }

    pub(crate) fn credit_surplus(&mut self, owner: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let updated = self.surplus_of(&owner) + amount;
        self.surplus.insert(owner, updated);
        self.globals.flows.surplus_credited += amount;
        self.emit(EngineEvent::SurplusCredited { owner, amount });
    }

    pub(crate) fn reindex(&mut self, position: &Position) {
        let nicr = compute_nominal_cr(position.collateral, position.debt);
        self.effects
            .index_updates
            .push(IndexUpdate::Insert(position.id, nicr));
    }

    pub(crate) fn unindex(&mut self, id: PositionId) {
        self.effects.index_updates.push(IndexUpdate::Remove(id));
    }

    /// Fold pending rewards into `position`, moving the matching amounts
    /// from the pending pool to the active pool.
    pub(crate) fn apply_rewards(&mut self, position: &mut Position) -> PendingRewards {
        let pending = self.globals.rewards.apply_to(position);
        let pools = &mut self.globals.pools;
        pools.pending.coll = pools.pending.coll.saturating_sub(pending.coll);
        pools.active.coll += pending.coll;
        pools.pending.debt = pools.pending.debt.saturating_sub(pending.debt);
        pools.active.debt += pending.debt;
        pending
    }

    /// Restake, reindex and store a mutated active position.
    fn finish_touch(&mut self, mut position: Position, operation: PositionOperation) {
        self.globals.stakes.update_stake(&mut position);
        self.reindex(&position);
        self.emit(EngineEvent::PositionUpdated {
            id: position.id,
            operation,
            collateral: position.collateral,
            debt: position.debt,
            stake: position.stake,
        });
        self.store(position);
    }

    /// Remove a position from the active set with a terminal status.
    pub(crate) fn close(&mut self, mut position: Position, status: PositionStatus) {
        self.globals.stakes.remove_stake(&mut position);
        position.close(status);
        self.globals.active_count = self.globals.active_count.saturating_sub(1);
        self.unindex(position.id);
        self.emit(EngineEvent::PositionClosed {
            id: position.id,
            status,
        });
        self.store(position);
    }

    /// Record entry into or exit from Recovery Mode.
    pub fn sync_grace_period(&mut self) {
        let now = self.market.now;
        match (self.mode(), self.globals.recovery_triggered_at) {
            (SystemMode::Recovery, None) => {
                self.globals.recovery_triggered_at = Some(now);
                info!(at = now, tcr = %self.tcr(), "Recovery mode entered");
                self.emit(EngineEvent::RecoveryModeEntered { at: now });
            }
            (SystemMode::Normal, Some(_)) => {
                self.globals.recovery_triggered_at = None;
                info!(at = now, "Recovery mode exited");
                self.emit(EngineEvent::RecoveryModeExited { at: now });
            }
            _ => {}
        }
    }

    // ---- position operations ----

    pub fn open_position(
        &mut self,
        owner: Address,
        coll: U256,
        debt: U256,
    ) -> EngineResult<PositionId> {
        if coll.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.require_min_debt(debt)?;

        let icr = self.icr(coll, debt);
        match self.mode() {
            SystemMode::Recovery => {
                if icr < self.params.selector.ccr {
                    return Err(EngineError::IcrBelowCcr);
                }
            }
            SystemMode::Normal => {
                if icr < self.params.selector.mcr {
                    return Err(EngineError::IcrBelowMcr);
                }
                if self.tcr_after(coll, U256::ZERO, debt, U256::ZERO) < self.params.selector.ccr {
                    return Err(EngineError::TcrBelowCcr);
                }
            }
        }

        let id = PositionId(self.globals.next_id);
        self.globals.next_id += 1;

        let mut position = Position::open(id, owner, coll, debt);
        position.snapshot = self.globals.rewards.snapshot();
        self.globals.stakes.update_stake(&mut position);

        self.globals.pools.active.coll += coll;
        self.globals.pools.active.debt += debt;
        self.globals.flows.deposited += coll;
        self.globals.active_count += 1;

        self.reindex(&position);
        self.emit(EngineEvent::PositionOpened {
            id,
            owner,
            collateral: coll,
            debt,
            stake: position.stake,
        });
        debug!(id = %id, coll = %coll, debt = %debt, stake = %position.stake, "Position opened");
        self.store(position);
        Ok(id)
    }

    pub fn add_collateral(&mut self, id: PositionId, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let mut position = self.load_active(id)?;
        self.apply_rewards(&mut position);

        position.collateral += amount;
        self.globals.pools.active.coll += amount;
        self.globals.flows.deposited += amount;

        self.finish_touch(position, PositionOperation::AddCollateral);
        Ok(())
    }

    pub fn withdraw_collateral(&mut self, id: PositionId, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let mut position = self.load_active(id)?;
        self.apply_rewards(&mut position);

        if self.mode() == SystemMode::Recovery {
            return Err(EngineError::NotAllowedInRecoveryMode);
        }
        if amount > position.collateral {
            return Err(EngineError::InsufficientCollateral {
                requested: amount,
                available: position.collateral,
            });
        }
        if self.icr(position.collateral - amount, position.debt) < self.params.selector.mcr {
            return Err(EngineError::IcrBelowMcr);
        }
        if self.tcr_after(U256::ZERO, amount, U256::ZERO, U256::ZERO) < self.params.selector.ccr {
            return Err(EngineError::TcrBelowCcr);
        }

        position.collateral -= amount;
        self.globals.pools.active.coll -= amount;
        self.globals.flows.withdrawn += amount;
        self.transfer(position.owner, amount);

        self.finish_touch(position, PositionOperation::WithdrawCollateral);
        Ok(())
    }

    pub fn draw_debt(&mut self, id: PositionId, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let mut position = self.load_active(id)?;
        self.apply_rewards(&mut position);

        let icr = self.icr(position.collateral, position.debt + amount);
        match self.mode() {
            SystemMode::Recovery => {
                if icr < self.params.selector.ccr {
                    return Err(EngineError::IcrBelowCcr);
                }
            }
            SystemMode::Normal => {
                if icr < self.params.selector.mcr {
                    return Err(EngineError::IcrBelowMcr);
                }
                let tcr = self.tcr_after(U256::ZERO, U256::ZERO, amount, U256::ZERO);
                if tcr < self.params.selector.ccr {
                    return Err(EngineError::TcrBelowCcr);
                }
            }
        }

        position.debt += amount;
        self.globals.pools.active.debt += amount;

        self.finish_touch(position, PositionOperation::DrawDebt);
        Ok(())
    }

    pub fn repay_debt(&mut self, id: PositionId, amount: U256) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let mut position = self.load_active(id)?;
        self.apply_rewards(&mut position);

        if amount >= position.debt {
            return Err(EngineError::RepayExceedsDebt);
        }
        self.require_min_debt(position.debt - amount)?;

        position.debt -= amount;
        self.globals.pools.active.debt = self.globals.pools.active.debt.saturating_sub(amount);

        self.finish_touch(position, PositionOperation::RepayDebt);
        Ok(())
    }

    /// Close by the owner; the collateral is returned to them.
    pub fn close_position(&mut self, id: PositionId) -> EngineResult<U256> {
        let mut position = self.load_active(id)?;
        if self.globals.active_count <= 1 {
            return Err(EngineError::OnlyOnePositionInSystem);
        }
        self.apply_rewards(&mut position);

        let (coll, debt) = (position.collateral, position.debt);
        if self.tcr_after(U256::ZERO, coll, U256::ZERO, debt) < self.params.selector.ccr {
            return Err(EngineError::TcrBelowCcr);
        }

        let pools = &mut self.globals.pools;
        pools.active.coll = pools.active.coll.saturating_sub(coll);
        pools.active.debt = pools.active.debt.saturating_sub(debt);
        self.globals.flows.withdrawn += coll;
        self.transfer(position.owner, coll);

        self.close(position, PositionStatus::ClosedByOwner);
        Ok(coll)
    }

    pub fn apply_pending_rewards(&mut self, id: PositionId) -> EngineResult<PendingRewards> {
        let mut position = self.load_active(id)?;
        let pending = self.apply_rewards(&mut position);
        self.finish_touch(position, PositionOperation::ApplyRewards);
        Ok(pending)
    }

    /// Swap `debt_amount` debt tokens for collateral at face value.
    ///
    /// A fully redeemed position closes and its remaining collateral
    /// becomes surplus for the owner.
    pub fn redeem(
        &mut self,
        redeemer: Address,
        id: PositionId,
        debt_amount: U256,
    ) -> EngineResult<U256> {
        if debt_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let mut position = self.load_active(id)?;
        self.apply_rewards(&mut position);

        if self.icr(position.collateral, position.debt) < self.params.selector.mcr {
            return Err(EngineError::IcrBelowMcr);
        }
        if debt_amount > position.debt {
            return Err(EngineError::RepayExceedsDebt);
        }
        let coll_out = mul_div(debt_amount, WAD, self.market.share_price);
        if coll_out > position.collateral {
            return Err(EngineError::InsufficientCollateral {
                requested: coll_out,
                available: position.collateral,
            });
        }
        let remaining = position.debt - debt_amount;
        let closes = remaining.is_zero();
        if closes && self.globals.active_count <= 1 {
            return Err(EngineError::OnlyOnePositionInSystem);
        }
        if !closes {
            self.require_min_debt(remaining)?;
        }

        position.debt = remaining;
        position.collateral -= coll_out;
        let pools = &mut self.globals.pools;
        pools.active.debt = pools.active.debt.saturating_sub(debt_amount);
        pools.active.coll = pools.active.coll.saturating_sub(coll_out);
        self.globals.flows.redeemed += coll_out;
        self.transfer(redeemer, coll_out);
        self.emit(EngineEvent::Redemption {
            id,
            redeemer,
            debt: debt_amount,
            coll: coll_out,
        });

        if closes {
            let leftover = position.collateral;
            let active = &mut self.globals.pools.active;
            active.coll = active.coll.saturating_sub(leftover);
            self.credit_surplus(position.owner, leftover);
            self.close(position, PositionStatus::ClosedByRedemption);
        } else {
            self.finish_touch(position, PositionOperation::Redeem);
        }
        Ok(coll_out)
    }

    pub fn claim_surplus(&mut self, owner: Address) -> EngineResult<U256> {
        let amount = self.surplus_of(&owner);
        if amount.is_zero() {
            return Err(EngineError::NothingToClaim);
        }
        self.surplus.insert(owner, U256::ZERO);
        self.globals.flows.surplus_claimed += amount;
        self.transfer(owner, amount);
        self.emit(EngineEvent::SurplusClaimed { owner, amount });
        Ok(amount)
    }

    // ---- staking split ----

    pub fn claim_split(&mut self) -> EngineResult<Option<SplitOutcome>> {
        let now = self.market.now;
        self.globals.yield_state.check_interval(now)?;

        let total_stakes = self.globals.stakes.total_stakes;
        let Some(outcome) = self.globals.yield_state.compute_split(
            self.market.index,
            self.globals.pools.total_coll(),
            self.globals.pools.active.coll,
        ) else {
            return Ok(None);
        };

        if !outcome.fee.is_zero() && !total_stakes.is_zero() {
            self.globals.rewards.accrue_fee(outcome.fee, total_stakes);
            self.globals.pools.active.coll -= outcome.fee;
            self.globals.flows.fees += outcome.fee;
            self.transfer(self.params.fee_recipient, outcome.fee);

            let total_coll = self.globals.pools.total_coll();
            self.globals.stakes.refresh_snapshots(total_coll);
        }
        self.globals.yield_state.advance(outcome.new_index, now);

        self.emit(EngineEvent::StakingSplitClaimed {
            old_index: outcome.old_index,
            new_index: outcome.new_index,
            yield_coll: outcome.yield_coll,
            fee: outcome.fee,
            fee_per_unit_staked: self.globals.rewards.fee_per_unit_staked,
        });
        Ok(Some(outcome))
    }

    pub fn set_split_bps(&mut self, bps: u32) -> EngineResult<()> {
        let old = self.globals.yield_state.set_split_bps(bps)?;
        let new = self.globals.yield_state.split_bps;
        self.emit(EngineEvent::SplitBpsUpdated { old, new });
        Ok(())
    }

    pub fn set_min_update_interval(&mut self, secs: u64) {
        let old = self.globals.yield_state.min_update_interval;
        self.globals.yield_state.min_update_interval = secs;
        self.emit(EngineEvent::UpdateIntervalUpdated { old, new: secs });
    }

    fn require_min_debt(&self, debt: U256) -> EngineResult<()> {
        if debt.is_zero() || debt < self.params.min_debt {
            return Err(EngineError::DebtBelowMinimum {
                debt,
                min: self.params.min_debt,
            });
        }
        Ok(())
    }
}

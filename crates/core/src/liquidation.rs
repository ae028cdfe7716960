//! Liquidation planning and execution.
//!
//! A batch walks its candidates in order. Before each step the system mode
//! and the remaining buffer capacity are re-read from the transaction, so a
//! batch that lifts TCR back above CCR continues under Normal Mode rules.
//! The buffer itself is only called once, with the batch totals, after the
//! whole plan succeeded.

use alloy::primitives::{Address, U256};
use cdp_chain::PositionId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::ledger::LedgerTx;
use crate::mode::{Eligibility, SkipReason, SystemMode, Treatment};
use crate::position::{Position, PositionStatus};
use crate::u256_math::{min, mul_div};

/// How the batch treats non-eligible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Caller-supplied ids: skip and continue
    Listed,
    /// Ascending-NICR walk: stop once nothing further can be eligible
    Sequential,
}

/// Outcome of liquidating one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidation {
    pub id: PositionId,
    pub owner: Address,
    pub mode: SystemMode,
    pub treatment: Treatment,
    /// Entire debt after pending rewards
    pub debt: U256,
    /// Entire collateral after pending rewards
    pub coll: U256,
    pub seized: U256,
    pub gas_compensation: U256,
    pub debt_offset: U256,
    pub coll_offset: U256,
    pub debt_redistributed: U256,
    pub coll_redistributed: U256,
    pub coll_surplus: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSummary {
    pub liquidated: SmallVec<[PositionId; 8]>,
    pub skipped: SmallVec<[(PositionId, SkipReason); 8]>,
    pub total_debt: U256,
    pub total_coll: U256,
    pub total_gas_compensation: U256,
    pub total_debt_offset: U256,
    pub total_coll_offset: U256,
    pub total_debt_redistributed: U256,
    pub total_coll_redistributed: U256,
    pub total_coll_surplus: U256,
    pub details: Vec<PositionLiquidation>,
}

impl LiquidationSummary {
    /// True when nothing was liquidated.
    pub fn is_empty(&self) -> bool {
        self.liquidated.is_empty()
    }

    fn record(&mut self, item: PositionLiquidation) {
        self.liquidated.push(item.id);
        self.total_debt += item.debt;
        self.total_coll += item.coll;
        self.total_gas_compensation += item.gas_compensation;
        self.total_debt_offset += item.debt_offset;
        self.total_coll_offset += item.coll_offset;
        self.total_debt_redistributed += item.debt_redistributed;
        self.total_coll_redistributed += item.coll_redistributed;
        self.total_coll_surplus += item.coll_surplus;
        self.details.push(item);
    }
}

/// Run a batch over `candidates` inside `tx`.
pub(crate) fn liquidate_batch(
    tx: &mut LedgerTx<'_>,
    liquidator: Address,
    candidates: &[PositionId],
    batch: BatchMode,
) -> EngineResult<LiquidationSummary> {
    tx.sync_grace_period();

    let selector = *tx.selector();
    let now = tx.market.now;
    let mut summary = LiquidationSummary::default();

    for &id in candidates {
        let Some(position) = tx.position(id).filter(Position::is_active) else {
            continue;
        };
        if tx.globals.active_count == 1 {
            return Err(EngineError::OnlyOnePositionInSystem);
        }

        let tcr = tx.tcr();
        let mode = selector.mode(tcr);
        let (debt, coll) = tx.globals.rewards.entire_debt_and_coll(&position);
        let icr = tx.icr(coll, debt);
        let grace_elapsed = selector.grace_elapsed(tx.globals.recovery_triggered_at, now);
        let buffer = tx.buffer_remaining();

        match selector.classify(mode, icr, tcr, debt, buffer, grace_elapsed) {
            Eligibility::Liquidate(treatment) => {
                let item = liquidate_one(tx, position, mode, treatment)?;
                summary.record(item);
            }
            Eligibility::Skip(reason) => {
                debug!(id = %id, icr = %icr, tcr = %tcr, ?mode, ?reason, "Position not liquidated");
                summary.skipped.push((id, reason));
                if batch == BatchMode::Sequential && stops_walk(reason, buffer) {
                    break;
                }
            }
        }
    }

    if !summary.is_empty() {
        tx.transfer(liquidator, summary.total_gas_compensation);
        tx.emit(EngineEvent::Liquidation {
            liquidator,
            liquidated: summary.liquidated.clone(),
            total_debt: summary.total_debt,
            total_coll: summary.total_coll,
            gas_compensation: summary.total_gas_compensation,
            debt_offset: summary.total_debt_offset,
            coll_offset: summary.total_coll_offset,
            debt_redistributed: summary.total_debt_redistributed,
            coll_redistributed: summary.total_coll_redistributed,
            coll_surplus: summary.total_coll_surplus,
        });
        info!(
            count = summary.liquidated.len(),
            debt = %summary.total_debt,
            coll = %summary.total_coll,
            debt_offset = %summary.total_debt_offset,
            debt_redistributed = %summary.total_debt_redistributed,
            surplus = %summary.total_coll_surplus,
            "Liquidation batch planned"
        );
    }
    Ok(summary)
}

/// Candidates come lowest-ICR first, so later ones cannot do better.
fn stops_walk(reason: SkipReason, buffer: U256) -> bool {
    match reason {
        SkipReason::AboveThreshold | SkipReason::GracePeriodActive => true,
        SkipReason::InsufficientBuffer => buffer.is_zero(),
    }
}

fn liquidate_one(
    tx: &mut LedgerTx<'_>,
    mut position: Position,
    mode: SystemMode,
    treatment: Treatment,
) -> EngineResult<PositionLiquidation> {
    if tx.globals.active_count <= 1 {
        return Err(EngineError::OnlyOnePositionInSystem);
    }
    tx.apply_rewards(&mut position);

    let id = position.id;
    let owner = position.owner;
    let debt = position.debt;
    let coll = position.collateral;
    let mcr = tx.selector().mcr;

    let seized = match treatment {
        Treatment::RedistributeOnly => coll,
        Treatment::OffsetThenRedistribute | Treatment::FullOffsetCapped => {
            min(coll, mul_div(debt, mcr, tx.market.share_price))
        }
    };
    let gas_compensation = seized / tx.params.gas_divisor;
    let net = seized - gas_compensation;

    let debt_offset = match treatment {
        Treatment::RedistributeOnly => U256::ZERO,
        Treatment::OffsetThenRedistribute => min(tx.buffer_remaining(), debt),
        Treatment::FullOffsetCapped => debt,
    };
    let coll_offset = mul_div(net, debt_offset, debt);
    let debt_redistributed = debt - debt_offset;
    let coll_redistributed = net - coll_offset;
    let coll_surplus = coll - seized;

    tx.globals.stakes.remove_stake(&mut position);
    let total_stakes = tx.globals.stakes.total_stakes;
    let has_remainder = !debt_redistributed.is_zero() || !coll_redistributed.is_zero();
    if has_remainder && total_stakes.is_zero() {
        return Err(EngineError::OnlyOnePositionInSystem);
    }

    let pools = &mut tx.globals.pools;
    pools.active.coll = pools.active.coll.saturating_sub(coll);
    pools.active.debt = pools.active.debt.saturating_sub(debt);

    if has_remainder {
        tx.globals
            .rewards
            .redistribute(debt_redistributed, coll_redistributed, total_stakes);
        tx.globals.pools.pending.coll += coll_redistributed;
        tx.globals.pools.pending.debt += debt_redistributed;
        let rewards = tx.globals.rewards;
        tx.emit(EngineEvent::Redistribution {
            id,
            debt: debt_redistributed,
            coll: coll_redistributed,
            debt_per_unit_staked: rewards.debt_per_unit_staked,
            coll_per_unit_staked: rewards.coll_per_unit_staked,
        });
    }
    let total_coll = tx.globals.pools.total_coll();
    tx.globals.stakes.refresh_snapshots(total_coll);

    tx.globals.flows.gas_compensation += gas_compensation;
    tx.globals.flows.coll_offset += coll_offset;
    tx.effects.buffer_offset.0 += debt_offset;
    tx.effects.buffer_offset.1 += coll_offset;

    tx.credit_surplus(owner, coll_surplus);
    tx.close(position, PositionStatus::ClosedByLiquidation);

    debug!(
        id = %id,
        ?treatment,
        debt = %debt,
        coll = %coll,
        seized = %seized,
        debt_offset = %debt_offset,
        debt_redistributed = %debt_redistributed,
        surplus = %coll_surplus,
        "Position liquidated"
    );

    Ok(PositionLiquidation {
        id,
        owner,
        mode,
        treatment,
        debt,
        coll,
        seized,
        gas_compensation,
        debt_offset,
        coll_offset,
        debt_redistributed,
        coll_redistributed,
        coll_surplus,
    })
}

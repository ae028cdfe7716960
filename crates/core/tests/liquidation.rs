mod common;

use alloy::primitives::U256;
use anyhow::Result as AnyResult;
use cdp_chain::{
    CollateralLedger, InMemoryCollateralLedger, LiquidityBuffer, ManualClock, MockRebasingAsset,
    NicrSortedIndex, PositionIndex, RoleAccessControl, StaticPriceOracle,
};
use cdp_core::{
    CdpEngine, Collaborators, EngineError, EngineEvent, PositionStatus, SkipReason, SystemMode,
    Treatment,
};
use common::*;
use std::sync::Arc;

/// A 10/500, B 10/400, C 1/80 opened at price 100, then price 85.
///
/// TCR = 21 * 85 / 980 ~ 182%, C sits at 106.25%.
fn normal_mode_setup(buffer: u64) -> (Harness, [cdp_chain::PositionId; 3]) {
    let h = Harness::new(config(900));
    let a = h.open(user(0xa), 10, 500);
    let b = h.open(user(0xb), 10, 400);
    let c = h.open(user(0xc), 1, 80);
    h.set_price(85);
    h.buffer.deposit(wad(buffer));
    (h, [a, b, c])
}

#[test]
fn test_normal_mode_full_offset() {
    let (h, [a, b, c]) = normal_mode_setup(100);
    assert!(!h.engine.check_recovery_mode().unwrap());

    let summary = h.engine.liquidate(liquidator(), &[a, b, c]).unwrap();
    assert_eq!(summary.liquidated.as_slice(), &[c]);
    assert_eq!(
        summary.skipped.as_slice(),
        &[(a, SkipReason::AboveThreshold), (b, SkipReason::AboveThreshold)]
    );

    let item = &summary.details[0];
    assert_eq!(item.mode, SystemMode::Normal);
    assert_eq!(item.treatment, Treatment::OffsetThenRedistribute);
    // debt * MCR / price = 88 / 85 > 1, so the whole collateral is seized
    assert_eq!(item.seized, wad(1));
    assert_eq!(item.gas_compensation, frac(5, 1_000));
    assert_eq!(item.debt_offset, wad(80));
    assert_eq!(item.coll_offset, frac(995, 1_000));
    assert_eq!(item.debt_redistributed, U256::ZERO);
    assert_eq!(item.coll_redistributed, U256::ZERO);
    assert_eq!(item.coll_surplus, U256::ZERO);

    assert_eq!(h.buffer.available_balance(), wad(20));
    assert_eq!(h.buffer.collateral_gains(), frac(995, 1_000));
    assert_eq!(h.ledger.balance_of(&liquidator()), frac(5, 1_000));
    assert_eq!(
        h.engine.get_position(c).status,
        PositionStatus::ClosedByLiquidation
    );
    assert!(!h.index.contains(c));
    assert_eq!(h.engine.active_count(), 2);
    assert_eq!(h.engine.reward_state().debt_per_unit_staked, U256::ZERO);
    h.assert_balanced();

    let events = h.engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(
            e,
            EngineEvent::Liquidation { liquidated, .. } if liquidated.as_slice() == [c]
        )));

    // already closed: nothing happens
    let before = h.engine.snapshot();
    let again = h.engine.liquidate(liquidator(), &[c]).unwrap();
    assert!(again.is_empty());
    assert!(again.skipped.is_empty());
    assert_eq!(h.engine.snapshot(), before);
}

#[test]
fn test_redistribution_with_empty_buffer() {
    let (h, [a, b, c]) = normal_mode_setup(0);

    let summary = h.engine.liquidate(liquidator(), &[c]).unwrap();
    let item = &summary.details[0];
    assert_eq!(item.debt_offset, U256::ZERO);
    assert_eq!(item.debt_redistributed, wad(80));
    assert_eq!(item.coll_redistributed, frac(995, 1_000));

    // remaining stakes: 10 + 10
    let rewards = h.engine.reward_state();
    assert_eq!(rewards.debt_per_unit_staked, wad(4));
    assert_eq!(rewards.coll_per_unit_staked, frac(4_975, 100_000));
    assert_eq!(rewards.coll_error, U256::ZERO);

    let entire = h.engine.entire_debt_and_coll(a).unwrap();
    assert_eq!(entire.pending.debt, wad(40));
    assert_eq!(entire.pending.coll, frac(4_975, 10_000));
    assert_eq!(entire.debt, wad(540));
    assert_eq!(entire.coll, wad(10) + frac(4_975, 10_000));

    let stakes = h.engine.stake_state();
    assert_eq!(stakes.total_stakes, wad(20));
    assert_eq!(stakes.total_stakes_snapshot, wad(20));
    assert_eq!(stakes.total_collateral_snapshot, wad(20) + frac(995, 1_000));

    let pools = h.engine.pool_totals();
    assert_eq!(pools.pending.debt, wad(80));
    assert_eq!(pools.pending.coll, frac(995, 1_000));
    assert_eq!(h.buffer.collateral_gains(), U256::ZERO);
    h.assert_balanced();

    // a new position is staked at the post-liquidation ratio
    let d = h
        .engine
        .open_position(user(0xd), wad(20) + frac(995, 1_000), wad(1_000))
        .unwrap();
    assert_eq!(h.engine.get_position(d).stake, wad(20));
    let d_entire = h.engine.entire_debt_and_coll(d).unwrap();
    assert!(d_entire.pending.is_zero());

    // applying B's rewards moves them from the pending to the active pool
    let applied = h.engine.apply_pending_rewards(b).unwrap();
    assert_eq!(applied.debt, wad(40));
    let pools = h.engine.pool_totals();
    assert_eq!(pools.pending.debt, wad(40));
    assert_eq!(pools.active.debt, wad(500) + wad(440) + wad(1_000));
    h.assert_balanced();
}

/// A 10/600, C 10/400, B 10/700 opened at 100, then price 80.
///
/// TCR = 30 * 80 / 1700 ~ 141% (Recovery); A 133%, B 114%, C 200%.
fn recovery_setup(grace: u64, buffer: u64) -> (Harness, [cdp_chain::PositionId; 3]) {
    let h = Harness::new(config(grace));
    let a = h.open(user(0xa), 10, 600);
    let c = h.open(user(0xc), 10, 400);
    let b = h.open(user(0xb), 10, 700);
    h.buffer.deposit(wad(buffer));
    h.set_price(80);
    (h, [a, b, c])
}

#[test]
fn test_recovery_grace_period_then_capped_offset() {
    let (h, [a, b, c]) = recovery_setup(900, 1_000);
    assert!(h.engine.check_recovery_mode().unwrap());
    assert_eq!(h.engine.recovery_triggered_at(), None);

    let first = h.engine.liquidate(liquidator(), &[b]).unwrap();
    assert!(first.is_empty());
    assert_eq!(first.skipped.as_slice(), &[(b, SkipReason::GracePeriodActive)]);
    assert_eq!(h.engine.recovery_triggered_at(), Some(START));

    h.clock.advance(899);
    let early = h.engine.liquidate(liquidator(), &[b]).unwrap();
    assert!(early.is_empty());

    h.clock.advance(1);
    let summary = h.engine.liquidate(liquidator(), &[b, a, c]).unwrap();
    assert_eq!(summary.liquidated.as_slice(), &[b]);

    let item = &summary.details[0];
    assert_eq!(item.mode, SystemMode::Recovery);
    assert_eq!(item.treatment, Treatment::FullOffsetCapped);
    // 700 * 1.1 / 80
    assert_eq!(item.seized, frac(9_625, 1_000));
    assert_eq!(item.gas_compensation, frac(48_125, 1_000_000));
    assert_eq!(item.debt_offset, wad(700));
    assert_eq!(item.coll_offset, frac(9_625, 1_000) - frac(48_125, 1_000_000));
    assert_eq!(item.debt_redistributed, U256::ZERO);
    assert_eq!(item.coll_surplus, frac(375, 1_000));

    // TCR is now 20 * 80 / 1000 = 160%: A and C are back above threshold
    assert_eq!(
        summary.skipped.as_slice(),
        &[(a, SkipReason::AboveThreshold), (c, SkipReason::AboveThreshold)]
    );
    assert!(!h.engine.check_recovery_mode().unwrap());
    assert_eq!(h.engine.recovery_triggered_at(), None);
    assert_eq!(h.buffer.available_balance(), wad(300));

    assert_eq!(h.engine.get_claimable(&user(0xb)), frac(375, 1_000));
    h.assert_balanced();

    assert_eq!(h.engine.claim_surplus(user(0xb)).unwrap(), frac(375, 1_000));
    assert_eq!(h.ledger.balance_of(&user(0xb)), frac(375, 1_000));
    assert_eq!(h.engine.get_claimable(&user(0xb)), U256::ZERO);
    assert_eq!(
        h.engine.claim_surplus(user(0xb)),
        Err(EngineError::NothingToClaim)
    );
    h.assert_balanced();

    let events = h.engine.drain_events();
    assert!(events.contains(&EngineEvent::RecoveryModeEntered { at: START }));
    assert!(events.contains(&EngineEvent::RecoveryModeExited { at: START + 900 }));
}

#[test]
fn test_recovery_insufficient_buffer_skips() {
    let (h, [a, b, c]) = recovery_setup(0, 500);
    let pools = h.engine.pool_totals();
    let positions = h.engine.active_positions();

    let summary = h.engine.liquidate(liquidator(), &[b, a, c]).unwrap();
    assert!(summary.is_empty());
    assert_eq!(
        summary.skipped.as_slice(),
        &[
            (b, SkipReason::InsufficientBuffer),
            (a, SkipReason::InsufficientBuffer),
            (c, SkipReason::AboveThreshold),
        ]
    );

    assert_eq!(h.engine.pool_totals(), pools);
    assert_eq!(h.engine.active_positions(), positions);
    assert_eq!(h.buffer.available_balance(), wad(500));
    assert_eq!(h.ledger.total(), U256::ZERO);
    // only the grace period start was recorded
    assert_eq!(h.engine.recovery_triggered_at(), Some(START));
}

#[test]
fn test_recovery_below_unit_icr_redistributes() {
    let h = Harness::new(config(0));
    let a = h.open(user(0xa), 10, 500);
    let _b = h.open(user(0xb), 10, 400);
    let d = h.open(user(0xd), 1, 80);
    h.buffer.deposit(wad(1_000));
    // TCR = 21 * 65 / 980 ~ 139%, D at 81%
    h.set_price(65);

    let summary = h.engine.liquidate(liquidator(), &[d]).unwrap();
    let item = &summary.details[0];
    assert_eq!(item.mode, SystemMode::Recovery);
    assert_eq!(item.treatment, Treatment::RedistributeOnly);
    assert_eq!(item.seized, wad(1));
    assert_eq!(item.debt_offset, U256::ZERO);
    assert_eq!(item.debt_redistributed, wad(80));
    assert_eq!(item.coll_redistributed, frac(995, 1_000));
    assert_eq!(h.buffer.available_balance(), wad(1_000));
    assert_eq!(h.buffer.collateral_gains(), U256::ZERO);

    let entire = h.engine.entire_debt_and_coll(a).unwrap();
    assert_eq!(entire.pending.debt, wad(40));
    h.assert_balanced();
}

#[test]
fn test_liquidate_lowest_walks_in_nicr_order() {
    let (h, [a, b, c]) = normal_mode_setup(100);
    assert_eq!(h.index.ascending(3), vec![c, a, b]);

    let summary = h.engine.liquidate_lowest(liquidator(), 3).unwrap();
    assert_eq!(summary.liquidated.as_slice(), &[c]);
    // the walk stops at the first position above threshold
    assert_eq!(summary.skipped.as_slice(), &[(a, SkipReason::AboveThreshold)]);
    assert_eq!(h.index.ascending(3), vec![a, b]);
}

#[test]
fn test_empty_list_and_inactive_position() {
    let (h, [_, _, c]) = normal_mode_setup(100);
    assert_eq!(
        h.engine.liquidate(liquidator(), &[]),
        Err(EngineError::EmptyPositionList)
    );

    h.engine.liquidate_position(liquidator(), c).unwrap();
    assert_eq!(
        h.engine.liquidate_position(liquidator(), c),
        Err(EngineError::PositionNotActive(c))
    );
}

#[test]
fn test_last_active_position_cannot_be_liquidated() {
    let h = Harness::new(config(0));
    let only = h.open(user(0xa), 10, 500);
    h.set_price(40);

    let before = h.engine.snapshot();
    assert_eq!(
        h.engine.liquidate(liquidator(), &[only]),
        Err(EngineError::OnlyOnePositionInSystem)
    );
    assert_eq!(h.engine.snapshot(), before);
    assert!(h.index.contains(only));
}

#[test]
fn test_repeat_liquidation_of_closed_position_is_noop() {
    let h = Harness::new(config(900));
    let a = h.open(user(0xa), 10, 500);
    let c = h.open(user(0xc), 1, 80);
    h.set_price(85);
    h.buffer.deposit(wad(100));

    // TCR = 11 * 85 / 580 ~ 161%, C at 106.25%
    let summary = h.engine.liquidate(liquidator(), &[c]).unwrap();
    assert_eq!(summary.liquidated.as_slice(), &[c]);
    assert_eq!(h.engine.active_count(), 1);

    let before = h.engine.snapshot();
    let again = h.engine.liquidate(liquidator(), &[c]).unwrap();
    assert!(again.is_empty());
    assert!(again.skipped.is_empty());
    assert_eq!(h.engine.snapshot(), before);

    // the remaining position still hits the guard
    assert_eq!(
        h.engine.liquidate(liquidator(), &[c, a]),
        Err(EngineError::OnlyOnePositionInSystem)
    );
    assert_eq!(h.engine.snapshot(), before);
}

/// Reports a balance but refuses every offset.
#[derive(Debug)]
struct BrokenBuffer;

impl LiquidityBuffer for BrokenBuffer {
    fn available_balance(&self) -> U256 {
        wad(1_000)
    }

    fn offset(&self, _debt: U256, _coll: U256) -> AnyResult<()> {
        anyhow::bail!("buffer paused")
    }
}

#[test]
fn test_buffer_failure_leaves_state_untouched() {
    let index = Arc::new(NicrSortedIndex::new());
    let ledger = Arc::new(InMemoryCollateralLedger::new());
    let oracle = Arc::new(StaticPriceOracle::new(wad(100)));
    let engine = CdpEngine::new(
        config(0),
        Collaborators {
            oracle: oracle.clone(),
            buffer: Arc::new(BrokenBuffer),
            index: index.clone(),
            asset: Arc::new(MockRebasingAsset::default()),
            ledger: ledger.clone(),
            access: Arc::new(RoleAccessControl::new()),
            clock: Arc::new(ManualClock::new(START)),
        },
    )
    .unwrap();
    engine.open_position(user(0xa), wad(10), wad(500)).unwrap();
    engine.open_position(user(0xb), wad(10), wad(400)).unwrap();
    let c = engine.open_position(user(0xc), wad(1), wad(80)).unwrap();
    oracle.set_price(wad(85));

    let before = engine.snapshot();
    let result = engine.liquidate(liquidator(), &[c]);
    assert!(matches!(result, Err(EngineError::Buffer(msg)) if msg.contains("paused")));

    assert_eq!(engine.snapshot(), before);
    assert!(index.contains(c));
    assert_eq!(ledger.total(), U256::ZERO);
}

#[test]
fn test_oracle_failure_blocks_liquidation() {
    let (h, [_, _, c]) = normal_mode_setup(100);
    h.oracle.set_price(U256::ZERO);

    let before = h.engine.snapshot();
    assert!(matches!(
        h.engine.liquidate(liquidator(), &[c]),
        Err(EngineError::Oracle(_))
    ));
    assert_eq!(h.engine.snapshot(), before);
}

mod common;

use alloy::primitives::U256;
use cdp_chain::{CollateralLedger, INDEX_ONE};
use cdp_core::{EngineError, EngineEvent};
use common::*;

/// A 10/100 and B 20/100, then the index grows 1.0 -> 1.5.
fn grown() -> (Harness, cdp_chain::PositionId, cdp_chain::PositionId) {
    let h = Harness::new(config(900));
    let a = h.open(user(0xa), 10, 100);
    let b = h.open(user(0xb), 20, 100);
    h.asset.set_index(frac(3, 2));
    h.clock.advance(43_200);
    (h, a, b)
}

#[test]
fn test_split_takes_fee_pro_rata() {
    let (h, a, b) = grown();

    let outcome = h.engine.claim_split().unwrap().expect("index grew");
    // 30 * 0.5 / 1.5
    assert_eq!(outcome.yield_coll, wad(10));
    assert_eq!(outcome.fee, frac(5, 2));
    assert_eq!(outcome.old_index, INDEX_ONE);
    assert_eq!(outcome.new_index, frac(3, 2));

    let rewards = h.engine.reward_state();
    assert_eq!(rewards.fee_per_unit_staked, U256::from(83_333_333_333_333_333u64));
    assert_eq!(rewards.fee_error, U256::from(10_000_000_000_000_000_000u128));

    let entire_a = h.engine.entire_debt_and_coll(a).unwrap();
    assert_eq!(entire_a.pending.fee, U256::from(833_333_333_333_333_330u64));
    assert_eq!(entire_a.coll, U256::from(9_166_666_666_666_666_670u64));
    let entire_b = h.engine.entire_debt_and_coll(b).unwrap();
    assert_eq!(entire_b.coll, U256::from(18_333_333_333_333_333_340u64));

    assert_eq!(h.ledger.balance_of(&fee_recipient()), frac(5, 2));
    assert_eq!(h.engine.pool_totals().active.coll, wad(30) - frac(5, 2));
    assert_eq!(h.engine.flow_totals().fees, frac(5, 2));

    let stakes = h.engine.stake_state();
    assert_eq!(stakes.total_stakes_snapshot, wad(30));
    assert_eq!(stakes.total_collateral_snapshot, wad(30) - frac(5, 2));

    let yield_state = h.engine.yield_state();
    assert_eq!(yield_state.last_index, frac(3, 2));
    assert_eq!(yield_state.last_update, START + 43_200);
    h.assert_balanced();

    let events = h.engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::StakingSplitClaimed { fee, .. } if *fee == frac(5, 2))));
}

#[test]
fn test_consecutive_splits_follow_collateral() {
    let h = Harness::new(config(900));
    h.open(user(0xa), 50, 1_000);
    h.open(user(0xb), 50, 1_000);

    h.asset.set_index(frac(3, 2));
    h.clock.advance(43_200);
    let first = h.engine.claim_split().unwrap().unwrap();
    // 100 * 0.5 / 1.5 * 25%
    assert_eq!(first.fee, U256::from(8_333_333_333_333_333_333u128));

    // stakes stay at 100 but only 91.67 shares back them now
    let coll = h.engine.pool_totals().total_coll();
    assert_eq!(coll, wad(100) - first.fee);
    assert_eq!(h.engine.stake_state().total_stakes, wad(100));

    h.asset.set_index(frac(9, 4));
    h.clock.advance(43_200);
    let second = h.engine.claim_split().unwrap().unwrap();
    // 91.67 * 0.75 / 2.25 * 25%
    assert_eq!(second.yield_coll, coll / U256::from(3u64));
    assert_eq!(second.fee, U256::from(7_638_888_888_888_888_888u128));

    assert_eq!(h.ledger.balance_of(&fee_recipient()), first.fee + second.fee);
    assert_eq!(h.engine.pool_totals().active.coll, wad(100) - first.fee - second.fee);
    h.assert_balanced();
}

#[test]
fn test_split_bps_above_max_rejected_at_construction() {
    let mut cfg = config(900);
    cfg.staking.split_bps = 20_000;
    let err = Harness::try_new(cfg).err().expect("config must be rejected");
    assert!(format!("{err:#}").contains("split_bps"));

    let mut cfg = config(900);
    cfg.staking.split_bps = 10_000;
    assert!(Harness::try_new(cfg).is_ok());
}

#[test]
fn test_split_rejected_inside_interval() {
    let (h, _, _) = grown();
    h.engine.claim_split().unwrap();

    h.asset.set_index(wad(2));
    let before = h.engine.snapshot();
    assert_eq!(
        h.engine.claim_split(),
        Err(EngineError::UpdateTooFrequent {
            elapsed: 0,
            required: 43_200
        })
    );
    assert_eq!(h.engine.snapshot(), before);

    h.clock.advance(43_199);
    assert!(matches!(
        h.engine.claim_split(),
        Err(EngineError::UpdateTooFrequent { elapsed: 43_199, .. })
    ));
}

#[test]
fn test_non_growing_index_is_noop() {
    let (h, _, _) = grown();
    h.engine.claim_split().unwrap();
    let rewards = h.engine.reward_state();
    let yield_state = h.engine.yield_state();

    h.clock.advance(43_200);
    assert_eq!(h.engine.claim_split().unwrap(), None);

    // a slashing-style drop does not move anything either
    h.asset.set_index(frac(6, 5));
    h.clock.advance(43_200);
    assert_eq!(h.engine.claim_split().unwrap(), None);

    assert_eq!(h.engine.reward_state(), rewards);
    assert_eq!(h.engine.yield_state(), yield_state);
    assert_eq!(h.ledger.balance_of(&fee_recipient()), frac(5, 2));
}

#[test]
fn test_fee_applied_on_touch() {
    let (h, a, _) = grown();
    h.engine.claim_split().unwrap();

    let applied = h.engine.apply_pending_rewards(a).unwrap();
    assert_eq!(applied.fee, U256::from(833_333_333_333_333_330u64));
    let view = h.engine.get_position(a);
    assert_eq!(view.collateral, U256::from(9_166_666_666_666_666_670u64));
    // restaked at snapshot ratio 30 / 27.5
    assert_eq!(
        view.stake,
        view.collateral * wad(30) / (wad(30) - frac(5, 2))
    );
    h.assert_balanced();
}

#[test]
fn test_split_bps_governance() {
    let h = Harness::new(config(900));
    assert_eq!(
        h.engine.set_split_bps(user(0x01), 1_000),
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        h.engine.set_split_bps(admin(), 10_001),
        Err(EngineError::ExceedsMax {
            value: 10_001,
            max: 10_000
        })
    );
    h.engine.set_split_bps(admin(), 10_000).unwrap();
    assert_eq!(h.engine.yield_state().split_bps, 10_000);

    h.engine.set_min_update_interval(admin(), 60).unwrap();
    assert_eq!(h.engine.yield_state().min_update_interval, 60);
    assert_eq!(
        h.engine.set_min_update_interval(user(0x01), 0),
        Err(EngineError::Unauthorized)
    );

    let events = h.engine.drain_events();
    assert!(events.contains(&EngineEvent::SplitBpsUpdated {
        old: 2_500,
        new: 10_000
    }));
    assert!(events.contains(&EngineEvent::UpdateIntervalUpdated {
        old: 43_200,
        new: 60
    }));
}

#[test]
fn test_full_split_with_single_staker() {
    let h = Harness::new(config(900));
    h.engine.set_split_bps(admin(), 10_000).unwrap();
    let a = h.open(user(0xa), 10, 100);
    h.asset.set_index(wad(2));
    h.clock.advance(43_200);

    let outcome = h.engine.claim_split().unwrap().unwrap();
    assert_eq!(outcome.yield_coll, wad(5));
    assert_eq!(outcome.fee, wad(5));
    assert_eq!(h.engine.entire_debt_and_coll(a).unwrap().coll, wad(5));
    h.assert_balanced();
}

//! U256 fixed-point arithmetic for collateralization math.
//!
//! Ratios are carried as WAD (1e18 = 100%). Thresholds live in config as
//! basis points and are converted once with [`bps_to_wad`].

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Upper bound for any basis-point parameter
pub const MAX_BPS: u16 = 10_000;

/// NICR precision: 1e20, keeps coll/debt ordering stable for small ratios
pub const NICR_PRECISION: U256 = U256::from_limbs([7_766_279_631_452_241_920u64, 5, 0, 0]);

/// Convert basis points to a WAD ratio (11000 bps -> 1.1e18).
#[inline(always)]
pub fn bps_to_wad(bps: u32) -> U256 {
    U256::from(bps) * WAD / BPS_DENOMINATOR
}

/// `value * bps / 10000`
#[inline(always)]
pub fn bps_of(value: U256, bps: u16) -> U256 {
    value * U256::from(bps) / BPS_DENOMINATOR
}

/// `a * b / d`, zero when `d` is zero.
#[inline(always)]
pub fn mul_div(a: U256, b: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::ZERO;
    }
    a * b / d
}

/// Price of one collateral share in debt units (WAD).
///
/// `price` is debt per underlying unit, `index` is underlying per share.
#[inline(always)]
pub fn share_price(price: U256, index: U256) -> U256 {
    price * index / WAD
}

/// Collateralization ratio in WAD: `coll * share_price / debt`.
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn compute_cr(coll: U256, debt: U256, share_price: U256) -> U256 {
    if debt.is_zero() {
        return U256::MAX;
    }
    coll * share_price / debt
}

/// Nominal (price-free) ratio: `coll * 1e20 / debt`.
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn compute_nominal_cr(coll: U256, debt: U256) -> U256 {
    if debt.is_zero() {
        return U256::MAX;
    }
    coll * NICR_PRECISION / debt
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad == U256::MAX {
        return f64::INFINITY;
    }
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limb_base = u64::MAX as f64 + 1.0;
        let value = wad
            .as_limbs()
            .iter()
            .rev()
            .fold(0.0, |acc, &limb| acc * limb_base + limb as f64);
        value / 1e18
    }
}

/// Convert f64 to WAD (18 decimals).
/// Use for converting config values to U256.
#[inline(always)]
pub fn f64_to_wad(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Safe minimum of two U256 values
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

/// Safe maximum of two U256 values
#[inline(always)]
pub fn max(a: U256, b: U256) -> U256 {
    if a > b {
        a
    } else {
        b
    }
}

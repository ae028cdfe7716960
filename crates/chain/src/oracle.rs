//! Price oracle abstraction.
//!
//! The engine only needs the latest collateral price, expressed as debt
//! units per one underlying collateral unit with 18 decimals. Staleness and
//! multi-source aggregation live behind this trait.

use alloy::primitives::U256;
use anyhow::Result;
use parking_lot::RwLock;
use std::fmt::Debug;
use tracing::debug;

/// Upper sanity bound for a WAD price (1e36, i.e. 1e18 debt units per collateral unit).
const MAX_SANE_PRICE: U256 = U256::from_limbs([0xb34b9f1000000000, 0x00c097ce7bc90715, 0, 0]);

/// Core trait for price lookups.
pub trait PriceOracle: Send + Sync + Debug {
    /// Latest price (18 decimals).
    fn get_price(&self) -> Result<U256>;

    /// Validate price against sanity checks.
    fn validate_price(&self, price: U256) -> bool {
        !price.is_zero() && price <= MAX_SANE_PRICE
    }
}

/// Oracle returning a manually set price.
///
/// Used by tests and the simulation binary.
#[derive(Debug)]
pub struct StaticPriceOracle {
    price: RwLock<U256>,
}

impl StaticPriceOracle {
    /// Create an oracle with an initial price.
    pub fn new(price: U256) -> Self {
        Self {
            price: RwLock::new(price),
        }
    }

    /// Replace the current price.
    pub fn set_price(&self, price: U256) {
        debug!(%price, "Oracle price updated");
        *self.price.write() = price;
    }
}

impl PriceOracle for StaticPriceOracle {
    fn get_price(&self) -> Result<U256> {
        let price = *self.price.read();
        if !self.validate_price(price) {
            anyhow::bail!("oracle price {} failed sanity checks", price);
        }
        Ok(price)
    }
}

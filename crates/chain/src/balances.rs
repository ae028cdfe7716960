//! Collateral transfer ledger.
//!
//! Outflows the engine decides on (surplus claims, fee split, gas
//! compensation, withdrawals, redemptions) are credited here. The engine
//! never debits; inbound transfers happen before it is called.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::fmt::Debug;
use tracing::debug;

/// Recipient side of collateral transfers.
pub trait CollateralLedger: Send + Sync + Debug {
    /// Credit `shares` collateral shares to `to`.
    fn credit(&self, to: Address, shares: U256);

    /// Collateral shares credited to `owner`.
    fn balance_of(&self, owner: &Address) -> U256;
}

/// Concurrent in-memory balance map.
#[derive(Debug, Default)]
pub struct InMemoryCollateralLedger {
    balances: DashMap<Address, U256>,
}

impl InMemoryCollateralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all credited balances.
    pub fn total(&self) -> U256 {
        self.balances
            .iter()
            .fold(U256::ZERO, |acc, entry| acc + *entry.value())
    }
}

impl CollateralLedger for InMemoryCollateralLedger {
    fn credit(&self, to: Address, shares: U256) {
        if shares.is_zero() {
            return;
        }
        *self.balances.entry(to).or_insert(U256::ZERO) += shares;
        debug!(to = %to, shares = %shares, "Collateral credited");
    }

    fn balance_of(&self, owner: &Address) -> U256 {
        self.balances
            .get(owner)
            .map(|entry| *entry.value())
            .unwrap_or(U256::ZERO)
    }
}

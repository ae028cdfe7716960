//! Claimable leftover collateral per owner.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurplusTracker {
    claimable: HashMap<Address, U256>,
}

impl SurplusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_claimable(&self, owner: &Address) -> U256 {
        self.claimable.get(owner).copied().unwrap_or(U256::ZERO)
    }

    /// Overwrite an owner's entry; zero removes it.
    pub fn set(&mut self, owner: Address, amount: U256) {
        if amount.is_zero() {
            self.claimable.remove(&owner);
        } else {
            self.claimable.insert(owner, amount);
        }
    }

    /// Sum of all outstanding entries.
    pub fn total(&self) -> U256 {
        self.claimable
            .values()
            .fold(U256::ZERO, |acc, amount| acc + *amount)
    }
}

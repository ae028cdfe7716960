//! Liquidity buffer (stability pool) contract.
//!
//! The engine only consumes `available_balance` and `offset`. How the buffer
//! spreads the absorbed debt and seized collateral over its depositors is
//! the buffer's own business.

use alloy::primitives::U256;
use anyhow::Result;
use parking_lot::Mutex;
use std::fmt::Debug;
use tracing::info;

/// Shared liquidity buffer used to absorb liquidated debt.
pub trait LiquidityBuffer: Send + Sync + Debug {
    /// Debt tokens currently available to offset liquidations.
    fn available_balance(&self) -> U256;

    /// Burn `debt` from the buffer and hand it `coll` collateral shares.
    ///
    /// Must either fully succeed or leave the buffer untouched.
    fn offset(&self, debt: U256, coll: U256) -> Result<()>;
}

#[derive(Debug, Default)]
struct BufferState {
    deposits: U256,
    collateral_gains: U256,
}

/// In-memory buffer tracking aggregate deposits and collateral gains.
#[derive(Debug, Default)]
pub struct InMemoryBuffer {
    state: Mutex<BufferState>,
}

impl InMemoryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer seeded with `deposits` debt tokens.
    pub fn with_deposits(deposits: U256) -> Self {
        let buffer = Self::new();
        buffer.deposit(deposits);
        buffer
    }

    /// Add debt tokens to the buffer.
    pub fn deposit(&self, amount: U256) {
        self.state.lock().deposits += amount;
    }

    /// Collateral shares received through offsets so far.
    pub fn collateral_gains(&self) -> U256 {
        self.state.lock().collateral_gains
    }
}

impl LiquidityBuffer for InMemoryBuffer {
    fn available_balance(&self) -> U256 {
        self.state.lock().deposits
    }

    fn offset(&self, debt: U256, coll: U256) -> Result<()> {
        let mut state = self.state.lock();
        if debt > state.deposits {
            anyhow::bail!(
                "offset of {} exceeds buffer deposits {}",
                debt,
                state.deposits
            );
        }
        state.deposits -= debt;
        state.collateral_gains += coll;

        info!(
            debt = %debt,
            coll = %coll,
            remaining = %state.deposits,
            "Buffer absorbed liquidation"
        );
        Ok(())
    }
}

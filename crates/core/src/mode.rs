//! Normal / Recovery mode and per-position liquidation treatment.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::u256_math::{compute_cr, WAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Normal,
    /// TCR below CCR
    Recovery,
}

/// How an eligible position is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Treatment {
    /// Entire collateral and debt redistributed, buffer untouched
    RedistributeOnly,
    /// Buffer absorbs what it can, the rest is redistributed
    OffsetThenRedistribute,
    /// Buffer absorbs all debt, seizure capped at `debt * MCR / price`
    FullOffsetCapped,
}

/// Why a candidate was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// ICR at or above the threshold for the current mode
    AboveThreshold,
    /// Buffer cannot cover the full debt
    InsufficientBuffer,
    /// Recovery Mode has not lasted long enough
    GracePeriodActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    Liquidate(Treatment),
    Skip(SkipReason),
}

/// Threshold set resolved from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationModeSelector {
    pub mcr: U256,
    pub ccr: U256,
    pub grace_period_secs: u64,
}

impl LiquidationModeSelector {
    pub fn new(mcr: U256, ccr: U256, grace_period_secs: u64) -> Self {
        Self {
            mcr,
            ccr,
            grace_period_secs,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.mcr(),
            config.ccr(),
            config.liquidation.recovery_grace_period_secs,
        )
    }

    /// System-wide ratio over active + pending totals.
    #[inline]
    pub fn tcr(&self, total_coll: U256, total_debt: U256, share_price: U256) -> U256 {
        compute_cr(total_coll, total_debt, share_price)
    }

    #[inline]
    pub fn mode(&self, tcr: U256) -> SystemMode {
        if tcr < self.ccr {
            SystemMode::Recovery
        } else {
            SystemMode::Normal
        }
    }

    /// Whether Recovery Mode has persisted past the grace period.
    pub fn grace_elapsed(&self, triggered_at: Option<u64>, now: u64) -> bool {
        match triggered_at {
            Some(at) => now >= at.saturating_add(self.grace_period_secs),
            None => false,
        }
    }

    /// Decide the treatment of one position.
    ///
    /// `buffer_available` is what the buffer still holds after earlier
    /// offsets in the same batch.
    pub fn classify(
        &self,
        mode: SystemMode,
        icr: U256,
        tcr: U256,
        debt: U256,
        buffer_available: U256,
        grace_elapsed: bool,
    ) -> Eligibility {
        match mode {
            SystemMode::Normal => {
                if icr < self.mcr {
                    Eligibility::Liquidate(Treatment::OffsetThenRedistribute)
                } else {
                    Eligibility::Skip(SkipReason::AboveThreshold)
                }
            }
            SystemMode::Recovery => {
                if icr >= tcr {
                    Eligibility::Skip(SkipReason::AboveThreshold)
                } else if icr < WAD {
                    Eligibility::Liquidate(Treatment::RedistributeOnly)
                } else if icr < self.mcr {
                    Eligibility::Liquidate(Treatment::OffsetThenRedistribute)
                } else if !grace_elapsed {
                    Eligibility::Skip(SkipReason::GracePeriodActive)
                } else if buffer_available < debt {
                    Eligibility::Skip(SkipReason::InsufficientBuffer)
                } else {
                    Eligibility::Liquidate(Treatment::FullOffsetCapped)
                }
            }
        }
    }
}

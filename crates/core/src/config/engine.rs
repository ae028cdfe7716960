//! Engine parameters with profile support.
//!
//! Ratios are stored in basis points, durations in seconds. Every field has
//! a serde default so partial TOML files are accepted.

use alloy::primitives::{Address, U256};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::u256_math::{bps_to_wad, f64_to_wad, MAX_BPS};

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Collateralization thresholds
    #[serde(default)]
    pub ratios: RatioConfig,

    /// Liquidation parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Staking-yield split parameters
    #[serde(default)]
    pub staking: StakingConfig,

    /// Position limits
    #[serde(default)]
    pub positions: PositionConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Collateralization thresholds in basis points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioConfig {
    /// Minimum collateral ratio (11000 = 110%)
    #[serde(default = "default_mcr_bps")]
    pub mcr_bps: u32,

    /// Critical system collateral ratio; TCR below it is Recovery Mode
    #[serde(default = "default_ccr_bps")]
    pub ccr_bps: u32,
}

fn default_mcr_bps() -> u32 {
    11_000
}
fn default_ccr_bps() -> u32 {
    15_000
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            mcr_bps: default_mcr_bps(),
            ccr_bps: default_ccr_bps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Liquidator receives seized / divisor as gas compensation
    #[serde(default = "default_gas_divisor")]
    pub coll_gas_compensation_divisor: u64,

    /// Seconds Recovery Mode must persist before MCR..TCR positions are eligible
    #[serde(default = "default_grace_period")]
    pub recovery_grace_period_secs: u64,

    /// Default `n` for liquidate_lowest callers that do not pass one
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_gas_divisor() -> u64 {
    200
}
fn default_grace_period() -> u64 {
    900
}
fn default_batch_size() -> usize {
    10
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            coll_gas_compensation_divisor: default_gas_divisor(),
            recovery_grace_period_secs: default_grace_period(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Protocol share of staking yield (2500 = 25%)
    #[serde(default = "default_split_bps")]
    pub split_bps: u16,

    /// Minimum seconds between split claims
    #[serde(default = "default_update_interval")]
    pub min_update_interval_secs: u64,

    /// Receiver of the split fee
    #[serde(default)]
    pub fee_recipient: Address,
}

fn default_split_bps() -> u16 {
    2_500
}
fn default_update_interval() -> u64 {
    43_200
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            split_bps: default_split_bps(),
            min_update_interval_secs: default_update_interval(),
            fee_recipient: Address::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Minimum outstanding debt of an active position, in whole tokens
    #[serde(default = "default_min_debt")]
    pub min_debt: f64,
}

fn default_min_debt() -> f64 {
    1.0
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            min_debt: default_min_debt(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            ratios: RatioConfig::default(),
            liquidation: LiquidationConfig::default(),
            staking: StakingConfig::default(),
            positions: PositionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Profile for tests and simulation: no grace period, short split interval.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            ratios: RatioConfig::default(),
            liquidation: LiquidationConfig {
                recovery_grace_period_secs: 0,
                batch_size: 50,
                ..Default::default()
            },
            staking: StakingConfig {
                min_update_interval_secs: 60,
                ..Default::default()
            },
            positions: PositionConfig {
                min_debt: 0.001, // allow dust positions
            },
        }
    }

    /// Profile with wider safety margins.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            ratios: RatioConfig {
                mcr_bps: 12_000,
                ccr_bps: 16_000,
            },
            liquidation: LiquidationConfig {
                coll_gas_compensation_divisor: 200,
                recovery_grace_period_secs: 1_800,
                batch_size: 5,
            },
            staking: StakingConfig {
                split_bps: 1_000,
                min_update_interval_secs: 86_400,
                ..Default::default()
            },
            positions: PositionConfig { min_debt: 100.0 },
        }
    }

    /// Get profile from environment variable CDP_PROFILE, or default.
    /// Supported values: testing, conservative
    pub fn from_env() -> Self {
        let profile = std::env::var("CDP_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "conservative" | "safe" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.ratios.mcr_bps >= MAX_BPS as u32,
            "mcr_bps must be at least 10000, got {}",
            self.ratios.mcr_bps
        );
        ensure!(
            self.ratios.ccr_bps > self.ratios.mcr_bps,
            "ccr_bps ({}) must exceed mcr_bps ({})",
            self.ratios.ccr_bps,
            self.ratios.mcr_bps
        );
        ensure!(
            self.liquidation.coll_gas_compensation_divisor > 0,
            "coll_gas_compensation_divisor must be non-zero"
        );
        ensure!(
            self.staking.split_bps <= MAX_BPS,
            "split_bps must be at most 10000, got {}",
            self.staking.split_bps
        );
        ensure!(self.positions.min_debt >= 0.0, "min_debt must be non-negative");
        Ok(())
    }

    /// MCR as a WAD ratio.
    pub fn mcr(&self) -> U256 {
        bps_to_wad(self.ratios.mcr_bps)
    }

    /// CCR as a WAD ratio.
    pub fn ccr(&self) -> U256 {
        bps_to_wad(self.ratios.ccr_bps)
    }

    /// Minimum debt in base units.
    pub fn min_debt(&self) -> U256 {
        f64_to_wad(self.positions.min_debt)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            mcr_bps = self.ratios.mcr_bps,
            ccr_bps = self.ratios.ccr_bps,
            "Collateral ratio thresholds"
        );
        tracing::info!(
            gas_divisor = self.liquidation.coll_gas_compensation_divisor,
            grace_period_secs = self.liquidation.recovery_grace_period_secs,
            batch_size = self.liquidation.batch_size,
            "Liquidation parameters"
        );
        tracing::info!(
            split_bps = self.staking.split_bps,
            min_interval_secs = self.staking.min_update_interval_secs,
            fee_recipient = %self.staking.fee_recipient,
            "Staking split parameters"
        );
        tracing::info!(min_debt = self.positions.min_debt, "Position limits");
    }
}

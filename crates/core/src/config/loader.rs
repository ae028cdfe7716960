//! Config resolution from the environment.
//!
//! Order: `CDP_CONFIG` (TOML path) if set, otherwise the `CDP_PROFILE`
//! profile. `FEE_RECIPIENT` overrides the staking fee recipient either way.

use super::EngineConfig;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Load and validate a configuration file.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .with_context(|| format!("Config path is not valid UTF-8: {:?}", path))?;
    let config = EngineConfig::from_file(path_str)
        .with_context(|| format!("Failed to load engine config from {:?}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid engine config in {:?}", path))?;
    Ok(config)
}

/// Resolve the engine configuration from environment variables.
pub fn load_config() -> Result<EngineConfig> {
    let mut config = match std::env::var("CDP_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading engine config file");
            load_config_file(&path)?
        }
        Err(_) => EngineConfig::from_env(),
    };

    if let Ok(recipient) = std::env::var("FEE_RECIPIENT") {
        config.staking.fee_recipient = parse_address(&recipient)
            .with_context(|| "FEE_RECIPIENT is not a valid address")?;
    }

    config.validate().context("Invalid engine config")?;
    Ok(config)
}

fn parse_address(s: &str) -> Result<Address> {
    s.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
}

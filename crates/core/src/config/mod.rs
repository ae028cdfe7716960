//! Engine configuration.
//!
//! - Runtime parameters (profiles, thresholds, intervals)
//! - Environment/file resolution

mod engine;
mod loader;

pub use engine::{EngineConfig, LiquidationConfig, PositionConfig, RatioConfig, StakingConfig};
pub use loader::{load_config, load_config_file};

//! Startup configuration: default parameters plus engine settings.
//!
//! Read once from a JSON document (see `config/defaults.json`); missing
//! fields fall back to the `Default` impls, which mirror the shipped file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::is_valid_grid_size;
use crate::params::SimulationParameters;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    /// One default value per simulation parameter.
    pub parameters: SimulationParameters,
    /// Generation strategy active at startup.
    pub default_generator: String,
    /// Erosion model active at startup.
    pub default_erosion_model: String,
    /// Upper bound on every worker readback.
    pub readback_timeout_ms: u64,
    /// Change in `erosion + deposition` below which erosion is at equilibrium.
    pub equilibrium_epsilon: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            parameters: SimulationParameters::default(),
            default_generator: "fbm".to_string(),
            default_erosion_model: "hydraulic".to_string(),
            readback_timeout_ms: 30_000,
            equilibrium_epsilon: 1e-5,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn readback_timeout(&self) -> Duration {
        Duration::from_millis(self.readback_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let size = self.parameters.generation.grid_size;
        if !is_valid_grid_size(size) {
            return Err(ConfigError::Invalid(format!("gridSize {size} is not a supported power of two")));
        }
        if self.readback_timeout_ms == 0 {
            return Err(ConfigError::Invalid("readbackTimeoutMs must be positive".into()));
        }
        if self.equilibrium_epsilon.is_nan() || self.equilibrium_epsilon <= 0.0 {
            return Err(ConfigError::Invalid("equilibriumEpsilon must be positive".into()));
        }
        Ok(())
    }
}

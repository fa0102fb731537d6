//! Pigeon CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `pigeon.toml` in the working directory
//! - `~/.pigeon/config.toml`
//! - a file given with `--config`
//! - environment variables prefixed `PIGEON_` (nested keys split on `__`, for
//!   example `PIGEON_CORE__SESSION__GROUP_OWNER_INTENT=7`)

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use pigeon_core::PigeonConfig;
use pigeon_harness::ScriptConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Loading(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Pigeon CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session core and runtime configuration
    pub core: PigeonConfig,
    /// CLI behavior
    pub cli: CliConfig,
    /// Simulated platform used by `simulate`
    pub simulation: ScriptConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,
    /// How long to wait for each simulated phase change, in milliseconds
    pub phase_timeout_ms: u64,
    /// API level the simulated platform reports
    pub simulated_api_level: Option<u32>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            phase_timeout_ms: 15_000,
            simulated_api_level: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("pigeon.toml"));

        if let Some(home_config) = Self::default_config_path() {
            figment = figment.merge(Toml::file(home_config));
        }
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Loading(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("PIGEON_").split("__"));

        Self::extract(figment)
    }

    /// Load configuration from TOML text on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(content));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        if let Some(api_level) = config.cli.simulated_api_level {
            config.core.permissions.api_level = api_level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Debug logging is on when either the flag or the configuration asks for it
    pub fn verbose_logging(&self, flag: bool) -> bool {
        flag || self.cli.verbose
    }

    /// `~/.pigeon/config.toml`, when a home directory is known
    fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pigeon").join("config.toml"))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.core
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.cli.phase_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "phase_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let (min, max) = self.simulation.latency_range;
        if min > max {
            return Err(ConfigError::Validation(format!(
                "latency range ({}, {}) is inverted",
                min, max
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.duplication_rate) {
            return Err(ConfigError::Validation(format!(
                "duplication_rate {} is outside 0.0..=1.0",
                self.simulation.duplication_rate
            )));
        }
        Ok(())
    }
}

//! Pigeon CLI library
//!
//! Command-line driver that runs a Pigeon session against the scripted platform
//! from `pigeon-harness` and reports what the session observed.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands, SimulateArgs};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, CliConfig, ConfigError};
pub use error::{CliError, Result};

//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and file loading
//! - [`defaults`]: serde default value functions
//! - [`env`]: environment variable overrides applied after the file
//! - [`validation`]: startup sanity checks

mod defaults;
mod env;
mod types;
mod validation;

pub use env::apply_env_overrides;
pub use types::{Config, ConfigError, LogConfig, LogFormat, ServerConfig, TranscriptConfig};
pub use validation::{ValidationError, validate};

/// Default config file name, used when neither a CLI argument nor
/// `CFG_FILE` names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

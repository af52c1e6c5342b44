//! Environment variable overrides.
//!
//! Applied on top of the file (or default) configuration so a container
//! can reconfigure the daemon without shipping a config file.

use super::types::{Config, ConfigError};
use std::str::FromStr;

pub const ENV_TRANSCRIPT_DIR: &str = "CHAT_LOG_DIR";
pub const ENV_CHAT_PORT: &str = "CHAT_PORT";
pub const ENV_HTTP_PORT: &str = "HTTP_PORT";
pub const ENV_ADDRESS: &str = "SRV_ADDR";
pub const ENV_MAX_HTTP_BODY: &str = "MAX_HTTP_BODY";

/// Apply overrides read through `lookup` (normally `std::env::var`).
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_TRANSCRIPT_DIR) {
        config.transcript.dir = dir;
    }
    if let Some(value) = lookup(ENV_CHAT_PORT) {
        config.server.chat_port = parse(ENV_CHAT_PORT, value)?;
    }
    if let Some(value) = lookup(ENV_HTTP_PORT) {
        config.server.http_port = parse(ENV_HTTP_PORT, value)?;
    }
    if let Some(value) = lookup(ENV_ADDRESS) {
        config.server.address = parse(ENV_ADDRESS, value)?;
    }
    if let Some(value) = lookup(ENV_MAX_HTTP_BODY) {
        config.server.max_http_body = parse(ENV_MAX_HTTP_BODY, value)?;
    }
    Ok(())
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { var, value })
}

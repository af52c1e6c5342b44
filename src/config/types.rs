//! Core configuration types and loading.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value:?}")]
    InvalidOverride { var: &'static str, value: String },
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener and HTTP settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Where the chat transcript is written.
    #[serde(default)]
    pub transcript: TranscriptConfig,
    /// Tracing output.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when `path` is the
    /// implicit default and does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P, explicit: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// Raw line-protocol chat port.
    #[serde(default = "default_chat_port")]
    pub chat_port: u16,
    /// HTTP control surface port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Maximum accepted HTTP request body, in bytes.
    #[serde(default = "default_max_http_body")]
    pub max_http_body: usize,
    /// Whole-request timeout for the HTTP control surface.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Longest line accepted from a chat client, in bytes.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Messages queued per session before a slow reader is disconnected.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            chat_port: default_chat_port(),
            http_port: default_http_port(),
            max_http_body: default_max_http_body(),
            http_timeout_secs: default_http_timeout_secs(),
            max_line_length: default_max_line_length(),
            send_queue: default_send_queue(),
        }
    }
}

impl ServerConfig {
    pub fn chat_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.chat_port)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.http_port)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Transcript location.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptConfig {
    /// Directory the per-run transcript file is created in.
    #[serde(default = "default_transcript_dir")]
    pub dir: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: default_transcript_dir(),
        }
    }
}

impl TranscriptConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

/// Tracing subscriber output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.chat_port and server.http_port must differ (both {0})")]
    PortClash(u16),
    #[error("server.max_http_body must be greater than zero")]
    ZeroBodyLimit,
    #[error("server.max_line_length must be greater than zero")]
    ZeroLineLength,
    #[error("server.send_queue must be greater than zero")]
    ZeroSendQueue,
    #[error("server.http_timeout_secs must be greater than zero")]
    ZeroHttpTimeout,
    #[error("transcript.dir is required")]
    MissingTranscriptDir,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    // Port 0 asks the OS for an ephemeral port, so two zeros never clash.
    if server.chat_port != 0 && server.chat_port == server.http_port {
        errors.push(ValidationError::PortClash(server.chat_port));
    }
    if server.max_http_body == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if server.max_line_length == 0 {
        errors.push(ValidationError::ZeroLineLength);
    }
    if server.send_queue == 0 {
        errors.push(ValidationError::ZeroSendQueue);
    }
    if server.http_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHttpTimeout);
    }
    if config.transcript.dir.trim().is_empty() {
        errors.push(ValidationError::MissingTranscriptDir);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

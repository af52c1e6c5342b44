//! Default value functions for configuration.

use std::net::{IpAddr, Ipv4Addr};

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

pub fn default_chat_port() -> u16 {
    2000
}

pub fn default_http_port() -> u16 {
    8080
}

/// Max bytes accepted in an injected HTTP message body.
pub fn default_max_http_body() -> usize {
    1024
}

pub fn default_http_timeout_secs() -> u64 {
    15
}

pub fn default_max_line_length() -> usize {
    4096
}

/// Per-session outbound queue, in messages.
pub fn default_send_queue() -> usize {
    64
}

// =============================================================================
// Transcript Defaults
// =============================================================================

pub fn default_transcript_dir() -> String {
    "/tmp".to_string()
}

// =============================================================================
// Log Defaults
// =============================================================================

pub fn default_log_level() -> String {
    "info".to_string()
}

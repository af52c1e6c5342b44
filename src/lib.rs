//! linechat - line-oriented multi-user chat daemon.
//!
//! Clients connect over a raw socket, pick a unique display name and
//! exchange newline-delimited messages that are broadcast to every other
//! connected client. An HTTP control surface offers liveness probes and
//! message injection on behalf of a connected user.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod network;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod transcript;

pub use server::{ChatServer, RunningServer};

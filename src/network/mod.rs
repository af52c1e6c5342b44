//! Network module.
//!
//! Contains the Gateway (TCP listener), the per-client Connection handler
//! and the line codec they share.

pub mod codec;
mod connection;
mod gateway;

pub use connection::{BLANK_NAME, Connection, NAME_PROMPT, SessionLimits, name_in_use};
pub use gateway::{Acceptor, Gateway};

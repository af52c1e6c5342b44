//! State management module.
//!
//! Contains the Matrix (shared server state), the user registry, the
//! broadcast engine and session lifecycle handling.

mod broadcast;
mod lifecycle;
mod matrix;
mod registry;
mod session;

pub use broadcast::{BroadcastEngine, roster_line, wire_payload};
pub use lifecycle::{JoinError, SessionGuard};
pub use matrix::Matrix;
pub use registry::{UserRegistry, UserSnapshot};
pub use session::{Outbox, Session, SessionWriter, prompt};

//! The Matrix - shared server state.
//!
//! Owns the user registry and the broadcast engine, and tracks whether the
//! chat listener is accepting connections. Both frontends (the socket
//! gateway and the HTTP control surface) hold an `Arc<Matrix>`.

use crate::state::{BroadcastEngine, UserRegistry};
use crate::transcript::Transcript;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Matrix {
    pub broadcaster: BroadcastEngine,
    listener_up: AtomicBool,
    /// Held from the name check until the registry insert, so joins are
    /// recorded in the order they become visible.
    pub(super) joining: Mutex<()>,
}

impl Matrix {
    pub fn new(transcript: Transcript) -> Self {
        let registry = Arc::new(UserRegistry::new());
        Self {
            broadcaster: BroadcastEngine::new(registry, transcript),
            listener_up: AtomicBool::new(false),
            joining: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<UserRegistry> {
        self.broadcaster.registry()
    }

    /// Whether the chat accept loop is live.
    pub fn is_listening(&self) -> bool {
        self.listener_up.load(Ordering::Acquire)
    }

    pub fn set_listening(&self, up: bool) {
        self.listener_up.store(up, Ordering::Release);
    }
}

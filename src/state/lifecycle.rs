//! Session registration and guaranteed deregistration.
//!
//! [`Matrix::join`] turns a negotiated connection into a registered
//! session and hands back a [`SessionGuard`]. The guard removes the session
//! from the registry on every exit path: explicitly through
//! [`SessionGuard::release`], or from `Drop` when the owning task errors
//! out, is cancelled or panics.

use crate::error::{RegistryError, TranscriptError};
use crate::state::{BroadcastEngine, Matrix, Session};
use crate::transcript::TranscriptRecord;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a negotiated session could not be registered.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The registry refused the name; the session was not kept.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The join record could not be written; nothing was registered.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

impl Matrix {
    /// Record the join, register `session`, send it the roster and announce
    /// it to everyone else.
    ///
    /// The name check, the join record and the insert happen under one lock,
    /// so a session is only ever visible to others once its join is durably
    /// recorded. On error the registry holds no reference to `session`.
    pub fn join(&self, session: Arc<Session>) -> Result<SessionGuard, JoinError> {
        let engine = &self.broadcaster;
        let record = TranscriptRecord::joined(session.name());
        {
            let _joining = self.joining.lock();
            engine.registry().check(session.name())?;
            engine.transcript().append(&record)?;
            engine.registry().join(Arc::clone(&session))?;
        }

        let guard = SessionGuard {
            name: session.name().to_string(),
            engine: engine.clone(),
            released: false,
        };
        info!(user = session.name(), "User joined");

        if let Err(e) = engine.announce_roster(&session) {
            warn!(user = session.name(), error = %e, "Failed to send roster");
        }
        if let Err(e) = engine.fan_out(&record) {
            warn!(user = session.name(), error = %e, "Join announcement incomplete");
        }
        Ok(guard)
    }
}

/// Keeps a session registered for as long as it lives.
#[must_use = "dropping the guard deregisters the session"]
pub struct SessionGuard {
    name: String,
    engine: BroadcastEngine,
    released: bool,
}

impl SessionGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deregister the session, record the exit and announce it.
    pub fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if deregister(&self.engine, &self.name) {
            announce_exit(&self.engine, &self.name);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("name", &self.name)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

fn deregister(engine: &BroadcastEngine, name: &str) -> bool {
    match engine.registry().exit(name) {
        Ok(_) => {
            info!(user = name, "User left");
            true
        }
        Err(e) => {
            debug!(user = name, error = %e, "Session already deregistered");
            false
        }
    }
}

fn announce_exit(engine: &BroadcastEngine, name: &str) {
    if let Err(e) = engine.deliver(TranscriptRecord::left(name)) {
        warn!(user = name, error = %e, "Exit announcement incomplete");
    }
}

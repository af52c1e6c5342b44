//! User registry: the single source of truth for who is connected.
//!
//! One coarse lock guards the whole map. The map itself is a persistent
//! `im::OrdMap`, so a snapshot is an O(1) clone that later joins and
//! exits cannot disturb. Callers iterate snapshots without holding the
//! lock, which keeps slow peer I/O from stalling registry mutation.

use crate::error::RegistryError;
use crate::state::Session;
use parking_lot::Mutex;
use std::sync::Arc;

/// Immutable view of the registry, ordered by name.
pub type UserSnapshot = im::OrdMap<String, Arc<Session>>;

#[derive(Default)]
pub struct UserRegistry {
    users: Mutex<UserSnapshot>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` under its name.
    ///
    /// Fails with `EmptyName` for a blank name and `NameConflict` if the
    /// name is already registered; the registry is unchanged on failure.
    pub fn join(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let name = session.name();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut users = self.users.lock();
        if users.contains_key(name) {
            return Err(RegistryError::NameConflict(name.to_string()));
        }
        users.insert(name.to_string(), session);
        crate::metrics::set_connected_users(users.len());
        Ok(())
    }

    /// The error `join` would return for `name` right now, if any.
    pub fn check(&self, name: &str) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.contains(name) {
            return Err(RegistryError::NameConflict(name.to_string()));
        }
        Ok(())
    }

    /// Remove `name`, returning its session.
    ///
    /// Removing an absent name returns `NotFound` and changes nothing, so a
    /// second exit for the same name is harmless.
    pub fn exit(&self, name: &str) -> Result<Arc<Session>, RegistryError> {
        let mut users = self.users.lock();
        let session = users
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        crate::metrics::set_connected_users(users.len());
        Ok(session)
    }

    /// Independent copy of the current registry.
    pub fn snapshot(&self) -> UserSnapshot {
        self.users.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.users.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.lock().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.users.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

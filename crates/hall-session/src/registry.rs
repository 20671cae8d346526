//! The session registry: every live connection and its token.
//!
//! # Concurrency note
//!
//! One `std::sync::Mutex` guards the whole map. Every operation is a
//! single hash-map lookup or a copy of the keys, and none of them await
//! or do I/O while the lock is held, so a blocking mutex is correct even
//! when called from async tasks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hall_protocol::ConnectionId;

use crate::{RegistryError, Session};

/// Thread-safe map from connection id to [`Session`].
///
/// Shared as `Arc<SessionRegistry>` between the lifecycle hooks, the
/// login relay, and the announcement poller.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly connected id with an empty token.
    ///
    /// # Errors
    /// - [`RegistryError::InvalidArgument`] for an empty id.
    /// - [`RegistryError::AlreadyExists`] if `id` is still registered; the
    ///   existing session is left untouched.
    pub fn add_connection(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "connection id can't be empty".into(),
            ));
        }

        let mut sessions = self.lock();
        if sessions.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.clone()));
        }
        sessions.insert(id.clone(), Session::new(id.clone()));
        let total = sessions.len();
        drop(sessions);

        tracing::debug!(connection_id = %id, total, "connection registered");
        Ok(())
    }

    /// Unregisters `id` and returns its final session record.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if `id` is not registered.
    pub fn remove_connection(&self, id: &ConnectionId) -> Result<Session, RegistryError> {
        let removed = self
            .lock()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        tracing::debug!(connection_id = %id, "connection unregistered");
        Ok(removed)
    }

    /// Attaches (or replaces) the auth token of a registered connection.
    ///
    /// Last write wins; setting the same token twice is a no-op.
    ///
    /// # Errors
    /// - [`RegistryError::InvalidArgument`] if `id` or `token` is empty.
    /// - [`RegistryError::NotFound`] if `id` is not registered. No entry
    ///   is created in that case.
    pub fn set_token(&self, id: &ConnectionId, token: &str) -> Result<(), RegistryError> {
        if id.is_empty() || token.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "connection id and token can't be empty".into(),
            ));
        }

        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        session.auth_token = token.to_string();
        drop(sessions);

        tracing::debug!(connection_id = %id, "token attached to connection");
        Ok(())
    }

    /// The token attached to `id`, or `None` if `id` is unknown or hasn't
    /// logged in yet.
    pub fn token(&self, id: &ConnectionId) -> Option<String> {
        self.lock()
            .get(id)
            .filter(|session| session.is_authenticated())
            .map(|session| session.auth_token.clone())
    }

    /// A snapshot of every registered id, in no particular order.
    ///
    /// Taken under the lock, so it never observes a half-applied
    /// add or remove.
    pub fn list_connection_ids(&self) -> Vec<ConnectionId> {
        self.lock().keys().cloned().collect()
    }

    /// `true` if `id` is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// No operation can leave the map half-updated, so a poisoned lock
    /// still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =========================================================================
// Tests
// =========================================================================

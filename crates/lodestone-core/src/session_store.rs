//! Session storage, one live session per peer identity.
//!
//! Sessions are stored in a concurrent map keyed by node id. Creating a
//! session for an identity replaces any prior one wholesale - a new
//! handshake always wins, and the old keys are dropped (and zeroized)
//! with the old session.
//!
//! Two interleaved handshakes for the same peer must not race their
//! get-or-create and key installation: callers take the per-identity
//! [`SessionStore::handshake_guard`] for the duration of any handshake
//! mutation, which serializes upgrades per peer without a global lock.

use crate::error::ProtocolError;
use crate::session::{Session, SessionRole};
use dashmap::DashMap;
use lodestone_discovery::NodeId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Owns all per-peer cryptographic sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<NodeId, Arc<Mutex<Session>>>,
    guards: DashMap<NodeId, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for an identity. Never creates.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Create a fresh session for an identity, replacing any prior one.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Crypto`] if ephemeral key generation
    /// fails.
    pub fn create(
        &self,
        role: SessionRole,
        id: NodeId,
        endpoint: SocketAddr,
        challenge_data: Option<Vec<u8>>,
    ) -> Result<Arc<Mutex<Session>>, ProtocolError> {
        let session = Arc::new(Mutex::new(Session::new(role, id, endpoint, challenge_data)?));
        let replaced = self.sessions.insert(id, Arc::clone(&session)).is_some();
        debug!(node_id = %id, ?role, replaced, "session created");
        Ok(session)
    }

    /// Remove the session for an identity, if any.
    pub fn remove(&self, id: &NodeId) {
        if self.sessions.remove(id).is_some() {
            debug!(node_id = %id, "session removed");
        }
    }

    /// The per-identity mutex serializing handshake mutations.
    ///
    /// Hold the lock across get-or-create and key installation so one
    /// handshake's derived keys cannot silently replace another's
    /// mid-flight.
    #[must_use]
    pub fn handshake_guard(&self, id: &NodeId) -> Arc<Mutex<()>> {
        self.guards
            .entry(*id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_get_does_not_create() {
        let store = SessionStore::new();
        assert!(store.get(&NodeId::random()).is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_create_replaces_prior_session() {
        let store = SessionStore::new();
        let id = NodeId::random();

        let first = store
            .create(SessionRole::Recipient, id, endpoint(), None)
            .unwrap();
        let second = store
            .create(SessionRole::Initiator, id, endpoint(), Some(b"ch".to_vec()))
            .unwrap();

        assert_eq!(store.count(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&store.get(&id).unwrap(), &second));
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        let id = NodeId::random();
        store
            .create(SessionRole::Recipient, id, endpoint(), None)
            .unwrap();

        store.remove(&id);
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_handshake_guard_serializes_per_identity() {
        let store = Arc::new(SessionStore::new());
        let id = NodeId::random();

        let guard = store.handshake_guard(&id);
        let held = guard.lock().await;

        // Same identity: second acquisition must wait.
        let other = store.handshake_guard(&id);
        assert!(other.try_lock().is_err());

        // Different identity: independent guard.
        let unrelated = store.handshake_guard(&NodeId::random());
        assert!(unrelated.try_lock().is_ok());

        drop(held);
        assert!(other.try_lock().is_ok());
    }
}

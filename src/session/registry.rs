//! Session registry: which streams are currently cancellable.
//!
//! The registry maps a [`SessionId`] to the stream's cancellation token.
//! Entries are inserted when a relay starts and removed by the relay's
//! [`SessionGuard`] when it ends, so presence in the table means the relay
//! loop is still running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SessionId;

/// Registry shared between request handlers.
pub type SharedRegistry = Arc<SessionRegistry>;

/// Concurrency-safe table of active streaming sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry wrapped for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, CancellationToken>> {
        // The table holds no invariant a panicking holder could break halfway.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session and return its id and cancellation token.
    pub fn create(&self) -> (SessionId, CancellationToken) {
        let id = SessionId::new();
        let token = CancellationToken::new();
        self.table().insert(id, token.clone());
        debug!(session_id = %id, "Session registered");
        (id, token)
    }

    /// Register a new session whose entry is removed when the guard drops.
    pub fn open(self: &Arc<Self>) -> SessionGuard {
        let (id, token) = self.create();
        SessionGuard {
            registry: Arc::clone(self),
            id,
            token,
        }
    }

    /// Fire the cancellation token of `id`.
    ///
    /// Returns `false` when the session is unknown or already released.
    /// Cancelling the same session twice is harmless.
    pub fn cancel(&self, id: &SessionId) -> bool {
        let token = self.table().get(id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                debug!(session_id = %id, "Session cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &SessionId) {
        if self.table().remove(id).is_some() {
            debug!(session_id = %id, "Session released");
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.table().contains_key(id)
    }

    /// Number of sessions currently registered.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Ownership of one registered session.
///
/// Dropping the guard removes the session from the registry. It never fires
/// the token; only an explicit cancel does.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SharedRegistry,
    id: SessionId,
    token: CancellationToken,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_registers_session() {
        let registry = SessionRegistry::new();
        let (id, token) = registry.create();

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_fires_token_once_and_is_repeatable() {
        let registry = SessionRegistry::new();
        let (id, token) = registry.create();

        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
        // Second signal on a still-registered session is a no-op, not a crash.
        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_unknown_session_is_not_found() {
        let registry = SessionRegistry::new();
        assert!(!registry.cancel(&SessionId::new()));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let (id, _token) = registry.create();

        registry.remove(&id);
        registry.remove(&id);

        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
        assert!(!registry.cancel(&id));
    }

    #[test]
    fn test_guard_releases_on_drop_without_cancelling() {
        let registry = SessionRegistry::shared();
        let guard = registry.open();
        let id = guard.id();
        let token = guard.token().clone();

        assert!(registry.contains(&id));
        drop(guard);

        assert!(!registry.contains(&id));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SessionRegistry::new();
        let ids: std::collections::HashSet<_> =
            (0..1_000).map(|_| registry.create().0).collect();
        assert_eq!(ids.len(), 1_000);
        assert_eq!(registry.len(), 1_000);
    }

    #[tokio::test]
    async fn test_concurrent_create_cancel_remove() {
        let registry = SessionRegistry::shared();
        let mut handles = Vec::new();

        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let guard = registry.open();
                    let id = guard.id();
                    assert!(registry.cancel(&id));
                    assert!(guard.is_cancelled());
                    drop(guard);
                    assert!(!registry.cancel(&id));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}

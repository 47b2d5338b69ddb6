use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use common::{error::AppError, storage::db::SurrealDbClient};

use crate::session::{ChatSession, Identity};

/// One web session's chat state plus its turn-in-flight flag. The mutex is
/// the turn admission control: whoever holds it owns the single allowed
/// `AwaitingReply` for this session.
pub struct SessionSlot {
    pub state: Mutex<ChatSession>,
    loading: Arc<AtomicBool>,
}

impl SessionSlot {
    fn new(identity: Identity) -> Self {
        Self {
            state: Mutex::new(ChatSession::new(identity)),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the loading flag for the duration of a turn. The flag drops on
    /// every exit path because the guard drops.
    pub fn begin_loading(&self) -> LoadingGuard {
        self.loading.store(true, Ordering::SeqCst);
        LoadingGuard(Arc::clone(&self.loading))
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}

pub struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns one `ChatSession` per live web session, keyed by the cookie
/// session id. Nothing here is global mutable state: the registry lives in
/// the router state and hands out explicitly scoped slots.
#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the slot for a session, creating it on first sight and
    /// reconciling the identity when the login state changed since the
    /// last request.
    pub async fn checkout(
        &self,
        session_id: &str,
        identity: Identity,
        db: &SurrealDbClient,
    ) -> Result<Arc<SessionSlot>, AppError> {
        let existing = {
            let slots = self.slots.read().await;
            slots.get(session_id).map(Arc::clone)
        };

        if let Some(slot) = existing {
            // A turn in flight holds the lock; identity reconciliation can
            // wait for the next request rather than stall this one.
            if let Ok(mut state) = slot.state.try_lock() {
                state.adopt_identity(identity, db).await?;
            }
            return Ok(slot);
        }

        debug!(session_id, "Creating chat session state");
        let slot = Arc::new(SessionSlot::new(identity));
        {
            let mut state = slot.state.lock().await;
            state.hydrate(db).await?;
        }

        let mut slots = self.slots.write().await;
        // A racing request may have created the slot in the meantime
        let slot = slots
            .entry(session_id.to_string())
            .or_insert(slot)
            .to_owned();

        Ok(slot)
    }

    /// Drop a session's in-memory state, e.g. on sign-out.
    pub async fn evict(&self, session_id: &str) {
        let mut slots = self.slots.write().await;
        slots.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_checkout_returns_same_slot() {
        let db = test_db().await;
        let registry = SessionRegistry::new();

        let first = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        {
            let mut state = first.state.lock().await;
            state
                .create_conversation(&db)
                .await
                .expect("Failed to create conversation");
        }

        let second = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");

        let state = second.state.lock().await;
        assert_eq!(state.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_isolates_sessions() {
        let db = test_db().await;
        let registry = SessionRegistry::new();

        let first = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        {
            let mut state = first.state.lock().await;
            state
                .create_conversation(&db)
                .await
                .expect("Failed to create conversation");
        }

        let other = registry
            .checkout("session_2", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        let state = other.state.lock().await;
        assert!(state.roster().is_empty());
    }

    #[tokio::test]
    async fn test_identity_change_is_reconciled() {
        let db = test_db().await;
        let registry = SessionRegistry::new();

        let slot = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        {
            let mut state = slot.state.lock().await;
            state
                .create_conversation(&db)
                .await
                .expect("Failed to create conversation");
        }

        // Same cookie session, now logged in: the guest roster survives
        let slot = registry
            .checkout("session_1", Identity::User("user_1".to_string()), &db)
            .await
            .expect("Failed to checkout slot");

        let state = slot.state.lock().await;
        assert_eq!(state.identity(), &Identity::User("user_1".to_string()));
        assert_eq!(state.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_loading_guard_clears_on_drop() {
        let db = test_db().await;
        let registry = SessionRegistry::new();

        let slot = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");

        assert!(!slot.is_loading());
        {
            let _guard = slot.begin_loading();
            assert!(slot.is_loading());
        }
        assert!(!slot.is_loading());
    }

    #[tokio::test]
    async fn test_evict_drops_state() {
        let db = test_db().await;
        let registry = SessionRegistry::new();

        let slot = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        {
            let mut state = slot.state.lock().await;
            state
                .create_conversation(&db)
                .await
                .expect("Failed to create conversation");
        }

        registry.evict("session_1").await;

        let fresh = registry
            .checkout("session_1", Identity::Guest, &db)
            .await
            .expect("Failed to checkout slot");
        let state = fresh.state.lock().await;
        assert!(state.roster().is_empty());
    }
}

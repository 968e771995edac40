//! In-memory stores
//!
//! Process-local implementations of the store capabilities. Suitable for a
//! single instance and for tests.

use super::{CsrfStore, SessionStore, UserStore};
use crate::error::StoreError;
use crate::models::{CsrfToken, Identity, NewUser, Session, SessionId, User};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Users held in a map keyed by ID
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;

        // Uniqueness is enforced under the write lock
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate {
                field: "email".to_string(),
            });
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        users.insert(created.id, created.clone());

        Ok(created)
    }
}

/// Sessions held in a map keyed by session ID
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired session, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        before - sessions.len()
    }

    /// IDs of the sessions that have not expired
    pub async fn live_ids(&self) -> HashSet<SessionId> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired())
            .map(|s| s.id.clone())
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn replace(
        &self,
        previous: Option<&SessionId>,
        session: Session,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = previous {
            sessions.remove(previous);
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}

/// CSRF bindings held in a map keyed by identity
#[derive(Debug, Default)]
pub struct MemoryCsrfStore {
    tokens: RwLock<HashMap<Identity, CsrfToken>>,
}

impl MemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop bindings issued more than `max_age_secs` ago, unless they
    /// belong to a session that is still live in `sessions`. Returns how
    /// many were removed.
    pub async fn purge(&self, max_age_secs: i64, sessions: &MemorySessionStore) -> usize {
        let live = sessions.live_ids().await;
        let cutoff = Utc::now() - Duration::seconds(max_age_secs);

        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|identity, token| {
            token.issued_at > cutoff
                || matches!(identity, Identity::Session(id) if live.contains(id))
        });
        before - tokens.len()
    }
}

#[async_trait]
impl CsrfStore for MemoryCsrfStore {
    async fn get_or_bind(&self, candidate: CsrfToken) -> Result<CsrfToken, StoreError> {
        let mut tokens = self.tokens.write().await;
        let bound = tokens
            .entry(candidate.bound_to.clone())
            .or_insert(candidate);
        Ok(bound.clone())
    }

    async fn lookup(&self, identity: &Identity) -> Result<Option<CsrfToken>, StoreError> {
        Ok(self.tokens.read().await.get(identity).cloned())
    }

    async fn invalidate(&self, identity: &Identity) -> Result<(), StoreError> {
        self.tokens.write().await.remove(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use std::sync::Arc;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ann".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_user_create_and_find() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ann@x.com")).await.unwrap();

        let by_email = store.find_by_email("ann@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ann@x.com");

        assert!(store.find_by_email("bob@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("ann@x.com")).await.unwrap();

        let err = store.create(new_user("ann@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "email"));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_admit_one() {
        let store = Arc::new(MemoryUserStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create(new_user("race@x.com")).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_session_replace_drops_previous() {
        let store = MemorySessionStore::new();
        let first = Session::start(Uuid::new_v4(), 60);
        store.replace(None, first.clone()).await.unwrap();

        let second = Session::start(first.user_id, 60);
        store.replace(Some(&first.id), second.clone()).await.unwrap();

        assert!(store.get(&first.id).await.unwrap().is_none());
        assert!(store.get(&second.id).await.unwrap().is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_session_destroy_is_idempotent() {
        let store = MemorySessionStore::new();
        let session = Session::start(Uuid::new_v4(), 60);
        store.replace(None, session.clone()).await.unwrap();

        store.destroy(&session.id).await.unwrap();
        store.destroy(&session.id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemorySessionStore::new();
        store
            .replace(None, Session::start(Uuid::new_v4(), -5))
            .await
            .unwrap();
        store
            .replace(None, Session::start(Uuid::new_v4(), 60))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_csrf_get_or_bind_keeps_first() {
        let store = MemoryCsrfStore::new();
        let identity = Identity::anonymous();

        let first = store.get_or_bind(CsrfToken::issue(&identity)).await.unwrap();
        let second = store.get_or_bind(CsrfToken::issue(&identity)).await.unwrap();
        assert_eq!(first.token, second.token);

        store.invalidate(&identity).await.unwrap();
        assert!(store.lookup(&identity).await.unwrap().is_none());
    }

    fn issued_ago(identity: &Identity, secs: i64) -> CsrfToken {
        let mut token = CsrfToken::issue(identity);
        token.issued_at = Utc::now() - Duration::seconds(secs);
        token
    }

    #[tokio::test]
    async fn test_csrf_purge_drops_stale_bindings() {
        let sessions = MemorySessionStore::new();
        let live = Session::start(Uuid::new_v4(), 86400);
        sessions.replace(None, live.clone()).await.unwrap();

        let store = MemoryCsrfStore::new();
        let stale_guest = Identity::anonymous();
        let fresh_guest = Identity::anonymous();
        let live_session = Identity::Session(live.id.clone());
        let gone_session = Identity::Session(SessionId::generate());

        for token in [
            issued_ago(&stale_guest, 7200),
            issued_ago(&fresh_guest, 10),
            issued_ago(&live_session, 7200),
            issued_ago(&gone_session, 7200),
        ] {
            store.get_or_bind(token).await.unwrap();
        }

        assert_eq!(store.purge(3600, &sessions).await, 2);
        assert!(store.lookup(&stale_guest).await.unwrap().is_none());
        assert!(store.lookup(&gone_session).await.unwrap().is_none());
        assert!(store.lookup(&fresh_guest).await.unwrap().is_some());
        assert!(store.lookup(&live_session).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_csrf_purge_bounds_cookieless_clients() {
        let sessions = MemorySessionStore::new();
        let store = MemoryCsrfStore::new();
        for _ in 0..1000 {
            store
                .get_or_bind(issued_ago(&Identity::anonymous(), 7200))
                .await
                .unwrap();
        }

        assert_eq!(store.purge(3600, &sessions).await, 1000);
        assert_eq!(store.purge(3600, &sessions).await, 0);
    }
}

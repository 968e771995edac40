//! Store Capabilities
//!
//! Persistence seams consumed by the authenticator and the CSRF binder.
//! Implementations must make each call atomic per key; the in-memory
//! stores serialize writers behind a lock, the Postgres user store relies
//! on the database.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCsrfStore, MemorySessionStore, MemoryUserStore};
pub use postgres::PgUserStore;

use crate::error::StoreError;
use crate::models::{CsrfToken, Identity, NewUser, Session, SessionId, User};

use async_trait::async_trait;
use uuid::Uuid;

/// Lookup and creation of user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Create a user. A taken email fails with `StoreError::Duplicate`.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

/// Session records keyed by the opaque cookie value
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Drop the session named by `previous` (if any) and insert `session`
    /// as one atomic step.
    async fn replace(&self, previous: Option<&SessionId>, session: Session)
        -> Result<(), StoreError>;

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Remove a session. Removing an absent session succeeds.
    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError>;
}

/// CSRF tokens keyed by identity, at most one per identity
#[async_trait]
pub trait CsrfStore: Send + Sync {
    /// Return the token already bound to `candidate.bound_to`, or bind
    /// `candidate` if there is none.
    async fn get_or_bind(&self, candidate: CsrfToken) -> Result<CsrfToken, StoreError>;

    async fn lookup(&self, identity: &Identity) -> Result<Option<CsrfToken>, StoreError>;

    /// Forget the token bound to `identity`. Absent bindings are a no-op.
    async fn invalidate(&self, identity: &Identity) -> Result<(), StoreError>;
}

//! Session Authentication
//!
//! Turns credentials into server-side sessions and resolves the session
//! cookie of an inbound request back to a user.
//!
//! Per browser the state machine is `Anonymous -> Authenticated ->
//! Anonymous`. Every successful attempt mints a fresh session id, replacing
//! whatever the cookie held before, and logout hands the browser a fresh
//! anonymous key. Both transitions rotate the CSRF binding.

use crate::csrf::CsrfBinder;
use crate::error::AuthError;
use crate::events::{AuthEvent, AuthEventListeners};
use crate::models::*;
use crate::password::PasswordHasher;
use crate::store::{SessionStore, UserStore};

use std::sync::Arc;
use tokio::sync::OnceCell;

/// Upper bound on accepted cookie values; longer values are discarded
const MAX_COOKIE_LEN: usize = 128;

/// Identity and user resolved from an inbound request's session cookie
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: Identity,
    pub user: Option<User>,
    /// The browser sent no usable cookie and `identity` was just minted
    pub minted: bool,
}

impl RequestIdentity {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Authentication service
pub struct SessionAuthenticator {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: Arc<dyn PasswordHasher>,
    csrf: Arc<CsrfBinder>,
    listeners: AuthEventListeners,
    session_lifetime: i64,
    remember_lifetime: i64,
    dummy_hash: OnceCell<String>,
}

impl SessionAuthenticator {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: Arc<dyn PasswordHasher>,
        csrf: Arc<CsrfBinder>,
        session_lifetime: i64,
        remember_lifetime: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            csrf,
            listeners: AuthEventListeners::with_logging(),
            session_lifetime,
            remember_lifetime,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Replace the event listeners
    pub fn with_listeners(mut self, listeners: AuthEventListeners) -> Self {
        self.listeners = listeners;
        self
    }

    // ============================================
    // Login / Logout
    // ============================================

    /// Attempt to authenticate `input` for the browser currently holding
    /// `current`.
    ///
    /// Returns `Ok(None)` when the email is unknown or the password is
    /// wrong; both cases run one password verification so they cannot be
    /// told apart by outcome or timing. On success any session held by
    /// `current` is replaced by a brand new one.
    pub async fn attempt(
        &self,
        current: &Identity,
        input: &LoginInput,
    ) -> Result<Option<Session>, AuthError> {
        let email = normalize_email(&input.email);
        let user = self.users.find_by_email(&email).await?;

        let verified = match &user {
            Some(user) => self.hasher.verify(&user.password_hash, &input.password).await,
            None => {
                self.burn_verification(&input.password).await;
                false
            }
        };

        let Some(user) = user.filter(|_| verified) else {
            self.listeners.emit(&AuthEvent::LoginFailed);
            return Ok(None);
        };

        let lifetime = if input.remember {
            self.remember_lifetime
        } else {
            self.session_lifetime
        };
        let session = Session::start(user.id, lifetime);

        let previous = match current {
            Identity::Session(id) => Some(id),
            Identity::Anonymous(_) => None,
        };
        self.sessions.replace(previous, session.clone()).await?;

        let next = Identity::Session(session.id.clone());
        if let Err(e) = self.csrf.rotate_on_auth_change(current, &next).await {
            tracing::error!(error = %e, user_id = %user.id, "CSRF rotation failed on login");
        }

        self.listeners.emit(&AuthEvent::LoginSucceeded {
            user_id: user.id,
            remember: input.remember,
        });

        Ok(Some(session))
    }

    /// End the session held by `current` and return the anonymous
    /// identity the browser carries from now on.
    ///
    /// Logging out an anonymous browser, or one whose session is already
    /// gone, still succeeds.
    pub async fn logout(&self, current: &Identity) -> Result<Identity, AuthError> {
        let next = Identity::anonymous();
        let mut user_id = None;

        if let Identity::Session(id) = current {
            user_id = self.sessions.get(id).await?.map(|s| s.user_id);
            self.sessions.destroy(id).await?;
        }

        if let Err(e) = self.csrf.rotate_on_auth_change(current, &next).await {
            tracing::error!(error = %e, "CSRF rotation failed on logout");
        }

        self.listeners.emit(&AuthEvent::LoggedOut { user_id });

        Ok(next)
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a new user.
    ///
    /// `input` must already have passed
    /// [`validate_registration`](crate::validation::validate_registration).
    pub async fn register(&self, input: &RegisterInput) -> Result<User, AuthError> {
        let input = input.normalized();
        let password_hash = self.hasher.hash(&input.password).await?;

        // Checked right before the insert; the store's unique constraint
        // settles concurrent registrations for the same email.
        if self.users.find_by_email(&input.email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }

        let user = self
            .users
            .create(NewUser {
                name: input.name,
                email: input.email,
                password_hash,
                role: UserRole::User,
            })
            .await?;

        self.listeners.emit(&AuthEvent::Registered { user_id: user.id });

        Ok(user)
    }

    // ============================================
    // Request Resolution
    // ============================================

    /// Resolve the user bound to a session cookie value.
    ///
    /// Missing, malformed, unknown and expired cookies all yield `None`;
    /// store failures are logged and yield `None` as well.
    pub async fn current_user(&self, cookie: Option<&str>) -> Option<User> {
        let cookie = cookie.filter(|c| is_well_formed_cookie(c))?;
        let id = SessionId::new(cookie);

        let session = match self.sessions.get(&id).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                return None;
            }
        };

        if session.is_expired() {
            if let Err(e) = self.sessions.destroy(&id).await {
                tracing::warn!(error = %e, "Failed to drop expired session");
            }
            return None;
        }

        match self.users.find_by_id(session.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, user_id = %session.user_id, "User lookup failed");
                None
            }
        }
    }

    /// Resolve the identity of a request from its session cookie, minting
    /// an anonymous identity when the cookie is missing or unusable.
    pub async fn resolve(&self, cookie: Option<&str>) -> RequestIdentity {
        let Some(value) = cookie.filter(|c| is_well_formed_cookie(c)) else {
            return RequestIdentity {
                identity: Identity::anonymous(),
                user: None,
                minted: true,
            };
        };

        match self.current_user(Some(value)).await {
            Some(user) => RequestIdentity {
                identity: Identity::Session(SessionId::new(value)),
                user: Some(user),
                minted: false,
            },
            None => RequestIdentity {
                identity: Identity::Anonymous(value.to_string()),
                user: None,
                minted: false,
            },
        }
    }

    /// Spend one verification on a throwaway hash so unknown emails cost
    /// the same as wrong passwords.
    async fn burn_verification(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash("rustpress-timing-equalizer"))
            .await;

        match dummy {
            Ok(hash) => {
                self.hasher.verify(hash, password).await;
            }
            Err(e) => tracing::warn!(error = %e, "Could not prepare timing-equalizer hash"),
        }
    }
}

fn is_well_formed_cookie(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_COOKIE_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//! RustPress Web Authentication
//!
//! Session authentication for server-rendered RustPress apps:
//! - Login and registration pages with inline form errors
//! - Server-side sessions behind an HttpOnly cookie, rotated on every login
//! - Argon2id password hashing
//! - CSRF tokens bound to the browser identity, rotated on login and logout
//! - Auth / Guest route guards
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables, see
//! [`AuthConfig::from_env`]:
//! - `SESSION_NAME` - Session cookie name (default: "rustpress_session")
//! - `SESSION_LIFETIME` - Session lifetime in seconds (default: 7200)
//! - `SESSION_REMEMBER_LIFETIME` - Lifetime with "remember me" (default: 2592000)
//! - `SESSION_SECURE_COOKIE` / `SESSION_SAME_SITE` - Cookie attributes
//! - `ARGON2_MEMORY_COST` / `ARGON2_TIME_COST` / `ARGON2_PARALLELISM`
//! - `CSRF_EXCLUDE_PATHS` - Comma-separated globs (default: "/api/webhooks/*,/health")
//! - `VIEW_VERSION` - Asset version stamped into every page
//!
//! # Usage
//!
//! ```rust,ignore
//! use rustpress_web_auth::{create_routes, AuthConfig, AuthState, MemoryUserStore};
//!
//! let config = AuthConfig::from_env();
//! let state = AuthState::new(config, Arc::new(MemoryUserStore::new()))?;
//! let app = create_routes(state);
//! ```

pub mod config;
pub mod csrf;
pub mod error;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod session;
pub mod store;
pub mod validation;
pub mod view;

// Re-export commonly used types
pub use config::{AuthConfig, SameSite};
pub use csrf::{CsrfBinder, PathExclusions, CSRF_PROP};
pub use error::{AuthError, StoreError};
pub use events::{AuthEvent, AuthEventListeners};
pub use extractors::{AuthUser, CurrentIdentity, FormOrJson};
pub use handlers::create_routes;
pub use models::*;
pub use password::{Argon2Hasher, PasswordHasher};
pub use session::{RequestIdentity, SessionAuthenticator};
pub use store::{
    CsrfStore, MemoryCsrfStore, MemorySessionStore, MemoryUserStore, PgUserStore, SessionStore,
    UserStore,
};
pub use validation::{validate_registration, ValidationErrors};
pub use view::{Page, PageRenderer, ViewRenderer};

use std::sync::Arc;

// ============================================
// Application State
// ============================================

/// Services shared by every handler, built once at startup
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub authenticator: Arc<SessionAuthenticator>,
    pub csrf: Arc<CsrfBinder>,
    pub view: Arc<dyn ViewRenderer>,
}

impl AuthState {
    /// Build the default service graph over `users`
    pub fn new(config: AuthConfig, users: Arc<dyn UserStore>) -> Result<Self, AuthError> {
        Self::builder(config, users).build()
    }

    pub fn builder(config: AuthConfig, users: Arc<dyn UserStore>) -> AuthStateBuilder {
        AuthStateBuilder {
            config,
            users,
            sessions: None,
            csrf_tokens: None,
            hasher: None,
            view: None,
            listeners: AuthEventListeners::with_logging(),
        }
    }
}

/// Builder for [`AuthState`]; unset components get the in-process defaults
pub struct AuthStateBuilder {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    sessions: Option<Arc<dyn SessionStore>>,
    csrf_tokens: Option<Arc<dyn CsrfStore>>,
    hasher: Option<Arc<dyn PasswordHasher>>,
    view: Option<Arc<dyn ViewRenderer>>,
    listeners: AuthEventListeners,
}

impl AuthStateBuilder {
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn csrf_tokens(mut self, tokens: Arc<dyn CsrfStore>) -> Self {
        self.csrf_tokens = Some(tokens);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn view(mut self, view: Arc<dyn ViewRenderer>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn listeners(mut self, listeners: AuthEventListeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Validate the configuration and wire the services together
    pub fn build(self) -> Result<AuthState, AuthError> {
        let config = self.config;
        config.validate()?;

        let sessions: Arc<dyn SessionStore> = match self.sessions {
            Some(sessions) => sessions,
            None => Arc::new(MemorySessionStore::new()),
        };
        let tokens: Arc<dyn CsrfStore> = match self.csrf_tokens {
            Some(tokens) => tokens,
            None => Arc::new(MemoryCsrfStore::new()),
        };
        let hasher: Arc<dyn PasswordHasher> = match self.hasher {
            Some(hasher) => hasher,
            None => Arc::new(Argon2Hasher::from_config(&config)),
        };
        let view: Arc<dyn ViewRenderer> = match self.view {
            Some(view) => view,
            None => Arc::new(PageRenderer::new(config.view_version.clone())),
        };

        let exclusions = PathExclusions::new(&config.csrf_exclude_paths)?;
        let csrf = Arc::new(CsrfBinder::new(tokens, sessions.clone(), exclusions));

        let authenticator = SessionAuthenticator::new(
            self.users,
            sessions,
            hasher,
            csrf.clone(),
            config.session_lifetime,
            config.remember_lifetime,
        )
        .with_listeners(self.listeners);

        Ok(AuthState {
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            csrf,
            view,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_with_defaults() {
        let state = AuthState::new(AuthConfig::default(), Arc::new(MemoryUserStore::new()));
        assert!(state.is_ok());
    }

    #[test]
    fn test_state_rejects_invalid_config() {
        let config = AuthConfig {
            session_lifetime: 0,
            ..AuthConfig::default()
        };
        let state = AuthState::new(config, Arc::new(MemoryUserStore::new()));
        assert!(matches!(state, Err(AuthError::Config(_))));
    }
}

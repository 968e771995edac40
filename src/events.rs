//! Authentication Events
//!
//! Lifecycle notifications emitted by the session authenticator. Listeners
//! are registered on the authenticator that owns them; there is no global
//! dispatcher.

use std::sync::Arc;
use uuid::Uuid;

/// Something that happened to a browser's authentication state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoginSucceeded { user_id: Uuid, remember: bool },
    LoginFailed,
    Registered { user_id: Uuid },
    LoggedOut { user_id: Option<Uuid> },
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Ordered list of event callbacks
#[derive(Clone, Default)]
pub struct AuthEventListeners {
    listeners: Vec<Listener>,
}

impl AuthEventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener set with the tracing logger installed
    pub fn with_logging() -> Self {
        let mut listeners = Self::new();
        listeners.listen(log_event);
        listeners
    }

    pub fn listen<F>(&mut self, listener: F)
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn emit(&self, event: &AuthEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for AuthEventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEventListeners")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn log_event(event: &AuthEvent) {
    match event {
        AuthEvent::LoginSucceeded { user_id, remember } => {
            tracing::info!(user_id = %user_id, remember = remember, "User logged in");
        }
        // Expected user input, not an application fault
        AuthEvent::LoginFailed => tracing::debug!("Login attempt rejected"),
        AuthEvent::Registered { user_id } => {
            tracing::info!(user_id = %user_id, "User registered");
        }
        AuthEvent::LoggedOut { user_id: Some(user_id) } => {
            tracing::info!(user_id = %user_id, "User logged out");
        }
        AuthEvent::LoggedOut { user_id: None } => tracing::debug!("Anonymous logout"),
    }
}

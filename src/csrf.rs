//! CSRF Token Binding
//!
//! Tokens are bound to a browser identity (anonymous key or session id).
//! A token validates only for the identity it was issued to, and only
//! while that identity is live: tokens of a destroyed or expired session
//! stop validating even if the binding itself was never cleaned up.

use crate::error::AuthError;
use crate::models::{CsrfToken, Identity};
use crate::store::{CsrfStore, SessionStore};

use regex::RegexSet;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared prop key carrying the token into rendered pages
pub const CSRF_PROP: &str = "csrf_token";

/// Glob-style path patterns that skip CSRF verification.
///
/// `*` matches any run of characters, including `/`. Everything else
/// matches literally against the full request path.
#[derive(Debug, Clone)]
pub struct PathExclusions {
    set: RegexSet,
}

impl PathExclusions {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, AuthError> {
        let set = RegexSet::new(patterns.iter().map(|p| glob_to_regex(p.as_ref())))
            .map_err(|e| AuthError::Config(format!("invalid CSRF exclude pattern: {e}")))?;

        Ok(Self { set })
    }

    pub fn empty() -> Self {
        Self {
            set: RegexSet::empty(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"))
}

/// Issues, validates and rotates CSRF tokens
pub struct CsrfBinder {
    tokens: Arc<dyn CsrfStore>,
    sessions: Arc<dyn SessionStore>,
    exclusions: PathExclusions,
}

impl CsrfBinder {
    pub fn new(
        tokens: Arc<dyn CsrfStore>,
        sessions: Arc<dyn SessionStore>,
        exclusions: PathExclusions,
    ) -> Self {
        Self {
            tokens,
            sessions,
            exclusions,
        }
    }

    /// Return the token bound to `identity`, minting one if none is bound.
    ///
    /// Repeated calls return the same token until the identity rotates.
    pub async fn issue_or_get_token(&self, identity: &Identity) -> Result<String, AuthError> {
        if let Some(existing) = self.tokens.lookup(identity).await? {
            return Ok(existing.token);
        }

        // Concurrent first requests race here; the store keeps one winner
        let bound = self.tokens.get_or_bind(CsrfToken::issue(identity)).await?;
        tracing::debug!("CSRF token issued");

        Ok(bound.token)
    }

    /// Check `presented` against the live token bound to `identity`
    pub async fn validate(&self, identity: &Identity, presented: &str) -> bool {
        if presented.is_empty() {
            return false;
        }

        match self.live_token(identity).await {
            Ok(Some(bound)) => constant_time_eq(bound.token.as_bytes(), presented.as_bytes()),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "CSRF token lookup failed");
                false
            }
        }
    }

    /// Invalidate the token of `old` and leave `new` unbound, so the next
    /// issue for `new` mints a fresh token.
    pub async fn rotate_on_auth_change(
        &self,
        old: &Identity,
        new: &Identity,
    ) -> Result<(), AuthError> {
        self.tokens.invalidate(old).await?;
        if new != old {
            self.tokens.invalidate(new).await?;
        }
        Ok(())
    }

    /// Whether `path` bypasses verification entirely
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.matches(path)
    }

    /// Props shared with every rendered page: `csrf_token` when a live
    /// token exists for `identity`, nothing otherwise.
    pub async fn shared_props(&self, identity: &Identity) -> Map<String, Value> {
        let mut props = Map::new();
        match self.live_token(identity).await {
            Ok(Some(bound)) => {
                props.insert(CSRF_PROP.to_string(), Value::String(bound.token));
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "CSRF token lookup failed"),
        }
        props
    }

    async fn live_token(&self, identity: &Identity) -> Result<Option<CsrfToken>, AuthError> {
        let Some(bound) = self.tokens.lookup(identity).await? else {
            return Ok(None);
        };

        if let Identity::Session(id) = identity {
            let live = self
                .sessions
                .get(id)
                .await?
                .is_some_and(|session| !session.is_expired());
            if !live {
                return Ok(None);
            }
        }

        Ok(Some(bound))
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

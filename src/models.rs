//! Authentication Models
//!
//! Data structures for form input, persisted entities, sessions and CSRF
//! bindings.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================
// Database Entities
// ============================================

/// User role enum matching database type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User entity owned by the user store
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a user
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

// ============================================
// Sessions & Identities
// ============================================

/// Opaque session identifier, also the session cookie value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session ID
    pub fn generate() -> Self {
        Self(random_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side session bound to one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for `user_id` lasting `lifetime_secs`
    pub fn start(user_id: Uuid, lifetime_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            user_id,
            created_at: now,
            expires_at: now + Duration::seconds(lifetime_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Seconds until expiry, never negative
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Key used to scope CSRF tokens: an authenticated session, or the
/// anonymous identity carried by a browser that has no session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Anonymous(String),
    Session(SessionId),
}

impl Identity {
    /// Mint a fresh anonymous identity
    pub fn anonymous() -> Self {
        Identity::Anonymous(random_token())
    }

    /// Value carried in the session cookie for this identity
    pub fn cookie_value(&self) -> &str {
        match self {
            Identity::Anonymous(key) => key,
            Identity::Session(id) => id.as_str(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Session(_))
    }
}

/// CSRF token bound to an identity
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub token: String,
    pub bound_to: Identity,
    pub issued_at: DateTime<Utc>,
}

impl CsrfToken {
    pub fn issue(identity: &Identity) -> Self {
        Self {
            token: random_token(),
            bound_to: identity.clone(),
            issued_at: Utc::now(),
        }
    }
}

/// 32 bytes from the OS-seeded CSPRNG, base64url without padding
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ============================================
// Request DTOs
// ============================================

/// Login form
#[derive(Clone, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default, deserialize_with = "deserialize_checkbox")]
    pub remember: bool,
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("remember", &self.remember)
            .finish()
    }
}

/// Registration form
#[derive(Clone, Default, Deserialize, Validate)]
pub struct RegisterInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required."))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,

    #[serde(default)]
    #[validate(must_match(
        other = "password",
        message = "The password confirmation does not match."
    ))]
    pub password_confirmation: String,
}

impl RegisterInput {
    /// Copy with the name trimmed and the email normalized. Passwords are
    /// kept as typed.
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
            password: self.password.clone(),
            password_confirmation: self.password_confirmation.clone(),
        }
    }
}

impl std::fmt::Debug for RegisterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterInput")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("password_confirmation", &"[redacted]")
            .finish()
    }
}

/// Emails are compared and stored trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Accepts a JSON boolean or an HTML checkbox value ("on", "true", "1")
fn deserialize_checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Checkbox {
        Bool(bool),
        Text(String),
    }

    Ok(match Checkbox::deserialize(deserializer)? {
        Checkbox::Bool(b) => b,
        Checkbox::Text(s) => matches!(s.to_ascii_lowercase().as_str(), "on" | "true" | "1" | "yes"),
    })
}

/// Non-sensitive input echoed back on a failed form submission
#[derive(Debug, Clone, Default, Serialize)]
pub struct OldInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

impl From<&LoginInput> for OldInput {
    fn from(input: &LoginInput) -> Self {
        Self {
            name: None,
            email: input.email.clone(),
        }
    }
}

impl From<&RegisterInput> for OldInput {
    fn from(input: &RegisterInput) -> Self {
        Self {
            name: Some(input.name.clone()),
            email: input.email.clone(),
        }
    }
}

// ============================================
// Response DTOs
// ============================================

/// Public user data exposed to pages
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique_and_url_safe() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_session_expiry() {
        let live = Session::start(Uuid::new_v4(), 60);
        assert!(!live.is_expired());
        assert!(live.remaining_secs() > 0);

        let dead = Session::start(Uuid::new_v4(), -1);
        assert!(dead.is_expired());
        assert_eq!(dead.remaining_secs(), 0);
    }

    #[test]
    fn test_register_input_normalized() {
        let input = RegisterInput {
            name: "  Ann ".to_string(),
            email: " Ann@X.com\t".to_string(),
            password: " secret ".to_string(),
            password_confirmation: " secret ".to_string(),
        };
        let normalized = input.normalized();
        assert_eq!(normalized.name, "Ann");
        assert_eq!(normalized.email, "ann@x.com");
        assert_eq!(normalized.password, " secret ");
    }

    #[test]
    fn test_remember_accepts_checkbox_and_bool() {
        let form: LoginInput =
            serde_urlencoded::from_str("email=a%40x.com&password=pw&remember=on").unwrap();
        assert!(form.remember);

        let json: LoginInput =
            serde_json::from_str(r#"{"email":"a@x.com","password":"pw","remember":true}"#).unwrap();
        assert!(json.remember);

        let absent: LoginInput = serde_json::from_str(r#"{"email":"a@x.com"}"#).unwrap();
        assert!(!absent.remember);
        assert!(absent.password.is_empty());
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let input = RegisterInput {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password: "secret123".into(),
            password_confirmation: "secret123".into(),
        };
        let printed = format!("{:?}", input);
        assert!(!printed.contains("secret123"));

        let login = LoginInput {
            email: "ann@x.com".into(),
            password: "secret123".into(),
            remember: false,
        };
        assert!(!format!("{:?}", login).contains("secret123"));
    }

    #[test]
    fn test_old_input_never_carries_password() {
        let input = RegisterInput {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password: "secret123".into(),
            password_confirmation: "secret123".into(),
        };
        let json = serde_json::to_value(OldInput::from(&input)).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Ann", "email": "ann@x.com"}));
    }

    #[test]
    fn test_user_serialization_skips_hash() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password_hash: "$argon2id$...".into(),
            role: UserRole::User,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }
}
